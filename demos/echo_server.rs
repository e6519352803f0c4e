//! Minimal TLS WebSocket echo server: every text frame sent to `/ws/{room}`
//! is echoed back to every client currently connected to that room.
//!
//! Requires a certificate and key on disk; generate a throwaway pair with:
//!
//! ```text
//! openssl req -x509 -newkey rsa:2048 -nodes -keyout key.pem -out cert.pem -days 1 -subj "/CN=localhost"
//! ```

use embercore::registry::{ArgValues, WsRegistration};
use embercore::websocket::connection::WsExchange;
use embercore::{Error, FrameworkContext, Server, ServerConfig};
use std::collections::HashSet;
use std::path::PathBuf;

fn echo(exchange: &mut WsExchange, payload: &[u8], _args: &ArgValues) -> Result<(), Error> {
  let text = std::str::from_utf8(payload).map_err(|e| Error::protocol(e.to_string()))?;
  exchange.send_text(text)
}

fn main() -> embercore::error::Result<()> {
  env_logger::init();

  let config = ServerConfig::new().tls_paths(PathBuf::from("cert.pem"), PathBuf::from("key.pem"));
  let ctx = FrameworkContext::new(config);

  ctx.registry.register_ws(
    WsRegistration {
      pattern: "/ws/{room:string}".to_string(),
      domains: HashSet::new(),
      required_headers: HashSet::new(),
      priority: embercore::priority::Priority::Normal,
      requirements: Vec::new(),
      transformers: Vec::new(),
    },
    echo,
  )?;

  let server = Server::new(ctx);
  log::info!("listening on wss://127.0.0.1:8443");
  server.listen_tls("127.0.0.1:8443")
}
