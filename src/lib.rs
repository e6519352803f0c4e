// Copyright 2023 Divy Srivastava <dj.srivastava23@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! _embercore_ is an embeddable HTTP and WebSocket server framework built on
//! blocking I/O and a bounded thread pool.
//!
//! It gives you one [`Server`] that owns a single listener for both plain
//! HTTP requests and WebSocket upgrades, a route registry with
//! priority-ordered matching and typed path parameters, a small
//! request/response transformer pipeline, and an RFC 6455 frame codec with
//! permessage-deflate.
//!
//! # Example
//!
//! ```no_run
//! use embercore::{FrameworkContext, Server, ServerConfig};
//!
//! fn main() -> embercore::error::Result<()> {
//!     let config = ServerConfig::default();
//!     let ctx = FrameworkContext::new(config);
//!     let server = Server::new(ctx);
//!     server.listen("127.0.0.1:8080")
//! }
//! ```
//!
//! ## Routing
//!
//! Handlers are registered against the context's [`RouteRegistry`] before the
//! server starts accepting connections; each registration carries a
//! [`priority::Priority`] used to break ties between patterns that could both
//! match the same request.
//!
//! ## WebSockets
//!
//! A WebSocket endpoint is just another registration, distinguished from an
//! HTTP one by its handler trait ([`WsHandler`] vs. [`HttpHandler`]). Once
//! accepted, a connection is driven by [`websocket::connection::serve`],
//! which owns the frame read loop, fragmentation, permessage-deflate, and
//! ping/pong bookkeeping.
//!
//! ## TLS
//!
//! Build with the default `tls` feature to get [`Server::listen_tls`], an
//! accept loop identical in shape to [`Server::listen`] but wrapping each
//! accepted socket in a `rustls::ServerConnection` before it reaches the
//! shared HTTP/WebSocket dispatch path.

pub mod body;
pub mod buffer;
pub mod config;
pub mod context;
pub mod cookie;
pub mod encoding;
pub mod error;
pub mod events;
pub mod exchange;
pub mod method;
pub mod pattern;
pub mod pool;
pub mod priority;
pub mod registry;
pub mod request;
pub mod requirement;
pub mod response;
pub mod server;
pub mod share;
#[cfg(feature = "tls")]
pub mod tls;
pub mod transformer;
pub mod websocket;
pub mod wire;

pub use config::ServerConfig;
pub use context::FrameworkContext;
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use method::Method;
pub use registry::{HttpHandler, HttpRegistration, RouteRegistry, WsHandler, WsRegistration};
pub use request::Request;
pub use response::Response;
pub use server::Server;
