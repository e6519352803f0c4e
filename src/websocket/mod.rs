//! WebSocket support (spec §4.H–§4.J): frame codec, handshake, the
//! permessage-deflate extension, the per-connection state machine, and the
//! accept-loop server that owns the `path -> set<client>` registry.

pub mod connection;
pub mod extension;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod server;

pub use connection::{ConnectionStatus, FragmentationPolicy, WsExchange};
pub use frame::{Frame, OpCode};
