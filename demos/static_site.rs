//! Serves `./public` over plain HTTP and answers `GET /health` with a plain
//! 200, demonstrating an HTTP endpoint registered alongside a static share.

use embercore::method::Method;
use embercore::registry::{ArgValues, HttpRegistration};
use embercore::{Exchange, FrameworkContext, Server, ServerConfig};
use std::collections::HashSet;
use std::path::PathBuf;

fn health(exchange: &mut Exchange, _args: &ArgValues) -> embercore::error::Result<()> {
  exchange.response.set_status(200)?;
  exchange.response.print_bytes(b"ok")
}

fn main() -> embercore::error::Result<()> {
  env_logger::init();

  let ctx = FrameworkContext::new(ServerConfig::new());

  let mut methods = HashSet::new();
  methods.insert(Method::Get);
  ctx.registry.register_http(
    HttpRegistration {
      pattern: "/health".to_string(),
      methods,
      domains: HashSet::new(),
      required_headers: HashSet::new(),
      priority: embercore::priority::Priority::Normal,
      requirements: Vec::new(),
      transformers: Vec::new(),
    },
    health,
  )?;

  ctx.registry.register_share("static", PathBuf::from("public"), "index.html")?;

  let server = Server::new(ctx);
  log::info!("listening on http://127.0.0.1:8080");
  server.listen("127.0.0.1:8080")
}
