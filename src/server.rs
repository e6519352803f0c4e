//! The HTTP request dispatcher (spec §4.G) and the TCP/TLS accept loop that
//! owns both the HTTP and WebSocket sides of one listener (spec §4.J),
//! routing each accepted connection to `websocket::connection::serve` or
//! `dispatch_http` based on the `Upgrade` header.
//!
//! The accept-loop shape -- one blocking `TcpListener::accept()` call
//! handing each connection to a bounded worker pool -- is grounded on the
//! plain synchronous webservers in the retrieval pack's `other_examples/`
//! (e.g. `danielfvm-dead_simple_webserver`), per the REDESIGN decision
//! recorded in `SPEC_FULL.md` §5: the teacher's `tokio`-async model is
//! replaced with `embercore::pool::ThreadPool` + blocking I/O.

use crate::body::BodyHandle;
use crate::context::FrameworkContext;
use crate::error::{Error, Result};
use crate::events::{Cancellable, RequestEvent};
use crate::exchange::Exchange;
use crate::method::Method;
use crate::pool::ThreadPool;
use crate::request::Request;
use crate::transformer::DispatchCache;
use crate::websocket;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

/// Embeds the framework: owns the route registry (via [`FrameworkContext`]),
/// the HTTP worker pool, and the WebSocket client registry.
pub struct Server {
  ctx: FrameworkContext,
  pool: ThreadPool,
  ws_manager: Arc<websocket::server::ClientManager>,
}

impl Server {
  pub fn new(ctx: FrameworkContext) -> Self {
    let pool_size = ctx.config.get_pool_size();
    Server {
      ctx,
      pool: ThreadPool::new(pool_size),
      ws_manager: websocket::server::ClientManager::new(),
    }
  }

  pub fn context(&self) -> &FrameworkContext {
    &self.ctx
  }

  pub fn client_manager(&self) -> &websocket::server::ClientManager {
    &self.ws_manager
  }

  /// Blocking plain-TCP accept loop. Each connection is handed to the
  /// worker pool; one worker handles exactly one connection's lifetime
  /// (a single request/response for HTTP, the full dispatch loop for a
  /// WebSocket upgrade).
  pub fn listen(&self, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)?;
    log::info!("embercore listening on {addr}");
    for incoming in listener.incoming() {
      let stream = match incoming {
        Ok(s) => s,
        Err(e) => {
          log::warn!("accept failed: {e}");
          continue;
        }
      };
      let ctx = self.ctx.clone();
      let manager = self.ws_manager.clone();
      self.pool.execute(move || {
        let peer_ip = stream
          .peer_addr()
          .map(|a| a.ip().to_string())
          .unwrap_or_else(|_| "unknown".to_string());
        if let Err(e) = handle_connection(stream, peer_ip, ctx, &manager) {
          log::debug!("connection ended: {e}");
        }
      });
    }
    Ok(())
  }

  /// Blocking TLS accept loop (spec §6: "HTTP/1.1 over TCP or TLS"). Loads
  /// certificate material from `ctx.config`'s configured paths once at
  /// startup.
  #[cfg(feature = "tls")]
  pub fn listen_tls(&self, addr: &str) -> Result<()> {
    let cert_path = self
      .ctx
      .config
      .tls_cert_path()
      .ok_or_else(|| Error::Tls("no certificate path configured".to_string()))?;
    let key_path = self
      .ctx
      .config
      .tls_key_path()
      .ok_or_else(|| Error::Tls("no private key path configured".to_string()))?;
    let material = crate::tls::TlsMaterial::load(
      cert_path,
      key_path,
      self.ctx.config.get_passphrase_char_pool(),
    )?;
    let tls_config = material.server_config()?;

    let listener = TcpListener::bind(addr)?;
    log::info!("embercore listening (tls) on {addr}");
    for incoming in listener.incoming() {
      let stream = match incoming {
        Ok(s) => s,
        Err(e) => {
          log::warn!("accept failed: {e}");
          continue;
        }
      };
      let ctx = self.ctx.clone();
      let manager = self.ws_manager.clone();
      let tls_config = tls_config.clone();
      self.pool.execute(move || {
        let peer_ip = stream
          .peer_addr()
          .map(|a| a.ip().to_string())
          .unwrap_or_else(|_| "unknown".to_string());
        let conn = match rustls::ServerConnection::new(tls_config) {
          Ok(c) => c,
          Err(e) => {
            log::warn!("tls handshake setup failed: {e}");
            return;
          }
        };
        let tls_stream = crate::tls::TlsStream::new(conn, stream);
        if let Err(e) = handle_connection(tls_stream, peer_ip, ctx, &manager) {
          log::debug!("tls connection ended: {e}");
        }
      });
    }
    Ok(())
  }

  /// Graceful shutdown (spec §4.J): sends 1001 to every connected
  /// WebSocket client. Dropping the `Server` joins every HTTP worker.
  pub fn shutdown(&self) {
    self.ws_manager.shutdown_all();
  }
}

fn handle_connection<S>(
  mut stream: S,
  peer_ip: String,
  ctx: FrameworkContext,
  manager: &websocket::server::ClientManager,
) -> Result<()>
where
  S: Read
    + Write
    + Send
    + websocket::connection::TryCloneStream
    + websocket::connection::SetReadTimeout
    + 'static,
{
  let head = crate::wire::read_request_head(&mut stream)?;

  let is_upgrade = head
    .headers
    .get("upgrade")
    .map(|v| v.eq_ignore_ascii_case("websocket"))
    .unwrap_or(false);

  if is_upgrade {
    let timeout = ctx.config.get_ws_read_timeout();
    return websocket::connection::serve(stream, peer_ip, ctx, timeout, manager);
  }

  dispatch_http(&mut stream, peer_ip, head, &ctx)
}

/// Status reason phrases for the response status line. Covers the codes
/// this crate itself ever sets; handlers setting an exotic code fall back
/// to a generic phrase.
fn reason_phrase(code: u16) -> &'static str {
  match code {
    200 => "OK",
    201 => "Created",
    204 => "No Content",
    301 => "Moved Permanently",
    302 => "Found",
    304 => "Not Modified",
    400 => "Bad Request",
    401 => "Unauthorized",
    403 => "Forbidden",
    404 => "Not Found",
    405 => "Method Not Allowed",
    500 => "Internal Server Error",
    501 => "Not Implemented",
    _ => "Unknown",
  }
}

/// Orchestrates §4.A-F over one already-parsed request head: resolves
/// remote IP, buffers the body, matches the registry, fires the request
/// event, runs the transformer pipeline, invokes each matching endpoint in
/// priority/registration order, and writes the response back to `stream`.
fn dispatch_http<S: Read + Write>(
  stream: &mut S,
  peer_ip: String,
  head: crate::wire::RequestHead,
  ctx: &FrameworkContext,
) -> Result<()> {
  let (method_str, target) = parse_request_line(&head.request_line)?;
  let method: Method = method_str.parse().unwrap();

  let content_length: u64 = head
    .headers
    .get("content-length")
    .and_then(|v| v.parse().ok())
    .unwrap_or(0);
  let temp_dir = ctx.config.resolve_temp_dir();
  let body = if content_length > 0 {
    let limited = stream.by_ref().take(content_length);
    BodyHandle::buffer_from_reader(limited, Some(content_length), &temp_dir)?
  } else {
    BodyHandle::empty()
  };

  let request = Request::new(target, head.headers, peer_ip, method, body);

  if method == Method::Get && ctx.registry.is_share(&request.path) {
    let mapping = ctx.registry.get_share(&request.path).unwrap();
    let sub_path = strip_share_prefix(&request.path, &mapping.prefix);
    let mut exchange = Exchange::new(request);
    crate::share::serve(
      &mapping,
      &sub_path,
      &ctx.events,
      &crate::share::DefaultMimeOracle,
      &mut exchange,
    )?;
    exchange.response.close()?;
    write_response(stream, &exchange.response)?;
    return Ok(());
  }

  let matches = ctx.registry.resolve_http(&request);
  if matches.is_empty() {
    log::info!("[not found] {} {}", request.method, request.raw_url);
    let mut exchange = Exchange::new(request);
    exchange.response.set_status(404)?;
    exchange.response.print_bytes(br#"{"error":"not found"}"#)?;
    exchange.response.close()?;
    write_response(stream, &exchange.response)?;
    return Ok(());
  }

  let fired = ctx.events.request.fire(RequestEvent {
    path: request.path.clone(),
    method: request.method.to_string(),
    cancel: Cancellable::default(),
  });
  if fired.cancel.is_cancelled() {
    let mut exchange = Exchange::new(request);
    exchange.response.close()?;
    write_response(stream, &exchange.response)?;
    return Ok(());
  }

  let mut exchange = Exchange::new(request);
  let mut cache = DispatchCache::new();

  for (mapping, captures) in matches {
    let args = match crate::transformer::run_pipeline(&mapping.transformers, &captures, &mut cache) {
      Ok(args) => args,
      Err(e) => {
        if !exchange.response.is_flushed() {
          let _ = exchange.response.set_status(400);
          let _ = exchange.response.print_bytes(
            format!(r#"{{"error":"transformer failed","detail":"{e}"}}"#).as_bytes(),
          );
        }
        continue;
      }
    };

    if let Err(e) = mapping.handler.call(&mut exchange, &args) {
      let wrapped = Error::unexpected(e.to_string());
      let id = match &wrapped {
        Error::Unexpected { id, .. } => id.clone(),
        _ => unreachable!(),
      };
      log::error!("handler error [{id}] on {}: {e}", exchange.request.path);
      if !exchange.response.is_flushed() {
        let _ = exchange.response.set_status(500);
        let _ = exchange
          .response
          .print_bytes(format!(r#"{{"error":"internal error","id":"{id}"}}"#).as_bytes());
      }
    }
  }

  exchange.response.close()?;
  write_response(stream, &exchange.response)
}

fn strip_share_prefix(path: &str, prefix: &str) -> String {
  let prefix = prefix.trim_matches('/');
  path.strip_prefix(prefix)
    .map(|rest| rest.trim_start_matches('/').to_string())
    .unwrap_or_default()
}

fn parse_request_line(line: &str) -> Result<(String, String)> {
  let mut parts = line.split_whitespace();
  let method = parts
    .next()
    .ok_or_else(|| Error::protocol("malformed request line"))?
    .to_string();
  let target = parts
    .next()
    .ok_or_else(|| Error::protocol("malformed request line"))?
    .to_string();
  Ok((method, target))
}

/// Writes the status line, headers, and body. When the response declared
/// `Transfer-Encoding: chunked` (spec §4.F: unknown `Content-Length`), the
/// buffered body is framed as a single data chunk followed by the
/// zero-length terminator chunk, since this writer always has the complete
/// body in hand by the time it reaches the wire.
fn write_response<S: Write>(stream: &mut S, response: &crate::response::Response) -> Result<()> {
  let head = response.render_head(reason_phrase(response.status()));
  stream.write_all(head.as_bytes())?;
  if response.header_value("transfer-encoding") == Some("chunked") {
    let body = response.body();
    if !body.is_empty() {
      stream.write_all(format!("{:x}\r\n", body.len()).as_bytes())?;
      stream.write_all(body)?;
      stream.write_all(b"\r\n")?;
    }
    stream.write_all(b"0\r\n\r\n")?;
  } else {
    stream.write_all(response.body())?;
  }
  stream.flush()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ServerConfig;
  use crate::priority::Priority;
  use crate::registry::{ArgValues, HttpRegistration};
  use std::collections::HashSet;
  use std::io::Cursor;

  fn ctx() -> FrameworkContext {
    FrameworkContext::new(ServerConfig::default())
  }

  /// A bidirectional in-memory stream standing in for a `TcpStream` in
  /// tests: reads drain `input`, writes accumulate in `output`.
  struct MockStream {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
  }

  impl MockStream {
    fn new(input: &[u8]) -> Self {
      MockStream {
        input: Cursor::new(input.to_vec()),
        output: Vec::new(),
      }
    }
  }

  impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
      self.input.read(buf)
    }
  }

  impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.output.extend_from_slice(buf);
      Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn parses_method_and_target_from_request_line() {
    let (method, target) = parse_request_line("GET /users/42?format=pretty HTTP/1.1").unwrap();
    assert_eq!(method, "GET");
    assert_eq!(target, "/users/42?format=pretty");
  }

  #[test]
  fn not_found_response_is_json_404() {
    let ctx = ctx();
    let raw = b"GET /nope HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let mut stream = MockStream::new(raw);
    let head = crate::wire::read_request_head(&mut stream).unwrap();
    dispatch_http(&mut stream, "127.0.0.1".to_string(), head, &ctx).unwrap();
    let text = String::from_utf8_lossy(&stream.output);
    assert!(text.starts_with("HTTP/1.1 404"));
    assert!(text.contains("not found"));
  }

  #[test]
  fn registered_endpoint_is_invoked_and_echoes_captured_id() {
    let ctx = ctx();
    let mut methods = HashSet::new();
    methods.insert(Method::Get);
    ctx.registry
      .register_http(
        HttpRegistration {
          pattern: "/users/{id:int}".to_string(),
          methods,
          domains: HashSet::new(),
          required_headers: HashSet::new(),
          priority: Priority::Normal,
          requirements: Vec::new(),
          transformers: vec![crate::transformer::TransformerDescriptor {
            parameter: "id".to_string(),
            transformer: crate::transformer::builtin_transformer(
              &crate::pattern::ParamType::Int,
            ),
            cacheable: true,
          }],
        },
        |exchange: &mut Exchange, args: &ArgValues| {
          let id = args[0].downcast_ref::<i64>().copied().unwrap_or(-1);
          exchange
            .response
            .print_bytes(format!(r#"{{"id":{id}}}"#).as_bytes())
        },
      )
      .unwrap();

    let raw = b"GET /users/42 HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let mut stream = MockStream::new(raw);
    let head = crate::wire::read_request_head(&mut stream).unwrap();
    dispatch_http(&mut stream, "127.0.0.1".to_string(), head, &ctx).unwrap();
    let text = String::from_utf8_lossy(&stream.output);
    assert!(text.contains(r#"{"id":42}"#));
  }

  #[test]
  fn format_pretty_query_pretty_prints_json_body() {
    let ctx = ctx();
    let mut methods = HashSet::new();
    methods.insert(Method::Get);
    ctx.registry
      .register_http(
        HttpRegistration {
          pattern: "/users/{id:int}".to_string(),
          methods,
          domains: HashSet::new(),
          required_headers: HashSet::new(),
          priority: Priority::Normal,
          requirements: Vec::new(),
          transformers: vec![crate::transformer::TransformerDescriptor {
            parameter: "id".to_string(),
            transformer: crate::transformer::builtin_transformer(
              &crate::pattern::ParamType::Int,
            ),
            cacheable: true,
          }],
        },
        |exchange: &mut Exchange, args: &ArgValues| {
          let id = args[0].downcast_ref::<i64>().copied().unwrap_or(-1);
          exchange.response.print_json(&serde_json::json!({"id": id}))
        },
      )
      .unwrap();

    let raw = b"GET /users/42?format=pretty HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let mut stream = MockStream::new(raw);
    let head = crate::wire::read_request_head(&mut stream).unwrap();
    dispatch_http(&mut stream, "127.0.0.1".to_string(), head, &ctx).unwrap();
    let text = String::from_utf8_lossy(&stream.output);
    assert!(text.contains("{\n  \"id\": 42\n}"));
  }

  #[test]
  fn chunked_response_frames_body_as_single_chunk_plus_terminator() {
    let mut response = crate::response::Response::new(true);
    response
      .print_stream(Cursor::new(b"hello".to_vec()))
      .unwrap();
    let mut stream = MockStream::new(b"");
    write_response(&mut stream, &response).unwrap();
    let text = String::from_utf8_lossy(&stream.output);
    assert!(text.ends_with("5\r\nhello\r\n0\r\n\r\n"));
  }
}
