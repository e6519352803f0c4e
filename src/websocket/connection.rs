//! The WebSocket connection machine (spec §4.I): state machine
//! `Accepted → HandshakeComplete → Dispatching → Closing → Closed`, message
//! assembly from frames, control-frame handling, and fragmented/compressed
//! outgoing sends.

use crate::context::FrameworkContext;
use crate::error::{check_close_code_selectable, Error, Result};
use crate::events::{Cancellable, OutgoingSocketMessageEvent, PingEvent, PongEvent};
use crate::request::{HeaderMap, Scratch};
use crate::transformer::{DispatchCache, TransformerException};
use crate::websocket::extension::{compress_payload, decompress_payload, DeflateConfig};
use crate::websocket::frame::{Frame, OpCode};
use crate::websocket::handshake;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
  Accepted,
  HandshakeComplete,
  Dispatching,
  Closing,
  Closed,
}

#[derive(Debug, Clone)]
pub struct FragmentationPolicy {
  pub enabled: bool,
  pub max_fragment_size: usize,
}

impl Default for FragmentationPolicy {
  fn default() -> Self {
    FragmentationPolicy {
      enabled: false,
      max_fragment_size: 64 * 1024,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct CloseMetadata {
  pub code: Option<u16>,
  pub reason: Option<String>,
  pub initiated_by_peer: bool,
}

/// Handed to `WsHandler::call` for every dispatched message. Holds the
/// send-side of the connection; reads happen in the owning worker loop in
/// `serve`, never here.
pub struct WsExchange {
  pub path: String,
  pub host: String,
  pub remote_ip: String,
  pub headers: HeaderMap,
  pub negotiated_extensions: Vec<String>,
  pub fragmentation: FragmentationPolicy,
  pub scratch: Scratch,
  events: Arc<crate::events::EventBus>,
  writer: Arc<Mutex<dyn Write + Send>>,
  status: Arc<Mutex<ConnectionStatus>>,
  deflate: DeflateConfig,
}

impl WsExchange {
  fn send_message(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<()> {
    let fired = self.events.outgoing_socket_message.fire(OutgoingSocketMessageEvent {
      opcode,
      payload_len: payload.len(),
      cancel: Cancellable::default(),
    });
    if fired.cancel.is_cancelled() {
      return Ok(());
    }

    let use_deflate = self.negotiated_extensions.iter().any(|e| e == "permessage-deflate")
      && payload.len() >= self.deflate.min_size;
    let (payload, rsv1) = if use_deflate {
      (compress_payload(&payload, &self.deflate), true)
    } else {
      (payload, false)
    };

    let frames = if self.fragmentation.enabled && payload.len() > self.fragmentation.max_fragment_size {
      fragment(opcode, rsv1, &payload, self.fragmentation.max_fragment_size)
    } else {
      vec![{
        let mut frame = Frame::new(true, opcode, payload);
        frame.rsv1 = rsv1;
        frame
      }]
    };

    let mut writer = self.writer.lock().unwrap();
    for frame in &frames {
      frame.write(&mut *writer)?;
    }
    Ok(())
  }

  pub fn send_text(&mut self, text: &str) -> Result<()> {
    self.send_message(OpCode::Text, text.as_bytes().to_vec())
  }

  pub fn send_binary(&mut self, data: &[u8]) -> Result<()> {
    self.send_message(OpCode::Binary, data.to_vec())
  }

  /// Closes the connection with `code`/`reason` (spec §4.I close codes).
  /// Rejects reserved internal codes (spec §8 property via `InvalidState`).
  pub fn close(&mut self, code: u16, reason: &[u8]) -> Result<()> {
    check_close_code_selectable(code)?;
    *self.status.lock().unwrap() = ConnectionStatus::Closing;
    let frame = Frame::close(code, reason);
    let mut writer = self.writer.lock().unwrap();
    frame.write(&mut *writer)
  }

  pub fn status(&self) -> ConnectionStatus {
    *self.status.lock().unwrap()
  }

  fn handle(&self) -> ClientHandle {
    ClientHandle {
      path: self.path.clone(),
      writer: self.writer.clone(),
      status: self.status.clone(),
    }
  }
}

/// A lightweight, cloneable reference to a connected client, held by
/// `websocket::server::ClientManager` for broadcast and shutdown (spec
/// §4.J: `path -> set<client>`). Distinct from `WsExchange`, which is only
/// valid for the duration of one dispatched message.
#[derive(Clone)]
pub struct ClientHandle {
  pub path: String,
  writer: Arc<Mutex<dyn Write + Send>>,
  status: Arc<Mutex<ConnectionStatus>>,
}

impl ClientHandle {
  pub fn send_text(&self, text: &str) -> Result<()> {
    self.send_frame(OpCode::Text, text.as_bytes().to_vec())
  }

  pub fn send_binary(&self, data: &[u8]) -> Result<()> {
    self.send_frame(OpCode::Binary, data.to_vec())
  }

  fn send_frame(&self, opcode: OpCode, payload: Vec<u8>) -> Result<()> {
    let frame = Frame::new(true, opcode, payload);
    let mut writer = self.writer.lock().unwrap();
    frame.write(&mut *writer)
  }

  pub fn close(&self, code: u16, reason: &[u8]) -> Result<()> {
    *self.status.lock().unwrap() = ConnectionStatus::Closing;
    let frame = Frame::close(code, reason);
    let mut writer = self.writer.lock().unwrap();
    frame.write(&mut *writer)
  }

  pub fn status(&self) -> ConnectionStatus {
    *self.status.lock().unwrap()
  }

  pub fn same_connection(&self, other: &ClientHandle) -> bool {
    Arc::ptr_eq(&self.writer, &other.writer)
  }

  #[cfg(test)]
  pub fn for_test(path: impl Into<String>, sink: Arc<Mutex<dyn Write + Send>>) -> Self {
    ClientHandle {
      path: path.into(),
      writer: sink,
      status: Arc::new(Mutex::new(ConnectionStatus::Dispatching)),
    }
  }
}

/// Splits `payload` into fragments per spec §4.H: first fragment carries
/// `opcode` with FIN=0, middle fragments CONTINUATION with FIN=0, last
/// fragment CONTINUATION with FIN=1. RSV1 only ever applies to the first
/// fragment (compression is computed over the whole message up front).
fn fragment(opcode: OpCode, rsv1: bool, payload: &[u8], max_fragment_size: usize) -> Vec<Frame> {
  if payload.is_empty() {
    let mut frame = Frame::new(true, opcode, Vec::new());
    frame.rsv1 = rsv1;
    return vec![frame];
  }

  let mut frames = Vec::new();
  let chunks: Vec<&[u8]> = payload.chunks(max_fragment_size).collect();
  let last = chunks.len() - 1;
  for (i, chunk) in chunks.iter().enumerate() {
    let is_last = i == last;
    let frame_opcode = if i == 0 { opcode } else { OpCode::Continuation };
    let mut frame = Frame::new(is_last, frame_opcode, chunk.to_vec());
    if i == 0 {
      frame.rsv1 = rsv1;
    }
    frames.push(frame);
  }
  frames
}

/// Runs the full lifecycle of one accepted TCP connection that has already
/// been identified as a WebSocket upgrade request: handshake, read loop,
/// message assembly, dispatch, and close.
pub fn serve<S>(
  mut stream: S,
  peer_ip: String,
  ctx: FrameworkContext,
  read_timeout: Duration,
  manager: &super::server::ClientManager,
) -> Result<()>
where
  S: Read + Write + Send + TryCloneStream + SetReadTimeout + 'static,
{
  let head = crate::wire::read_request_head(&mut stream)?;
  let handshake_req = handshake::parse_request(&head.request_line, &head.headers)?;
  let accept = handshake::compute_accept(&handshake_req.key);
  let negotiated = handshake::negotiate_extensions(
    &handshake_req.extensions,
    &["permessage-deflate"],
  );
  let response = handshake::render_response(&accept, &negotiated);
  stream.write_all(response.as_bytes())?;

  stream.set_read_timeout(Some(read_timeout))?;

  let status = Arc::new(Mutex::new(ConnectionStatus::HandshakeComplete));
  let write_half = stream.try_clone()?;
  let writer: Arc<Mutex<dyn Write + Send>> = Arc::new(Mutex::new(write_half));

  let mut exchange = WsExchange {
    path: handshake_req.path.clone(),
    host: handshake_req.host.clone(),
    remote_ip: peer_ip,
    headers: head.headers.clone(),
    negotiated_extensions: negotiated,
    fragmentation: FragmentationPolicy::default(),
    scratch: Scratch::new(),
    events: ctx.events.clone(),
    writer: writer.clone(),
    status: status.clone(),
    deflate: ctx.config.deflate().clone(),
  };

  *status.lock().unwrap() = ConnectionStatus::Dispatching;

  let handle = exchange.handle();
  manager.register(handle.clone());

  let mut reader = stream;
  let result = read_loop(&mut reader, &mut exchange, &ctx);
  manager.unregister(&handle);

  *status.lock().unwrap() = ConnectionStatus::Closed;
  result
}

fn read_loop<S: Read>(stream: &mut S, exchange: &mut WsExchange, ctx: &FrameworkContext) -> Result<()> {
  let mut assembling: Option<(OpCode, bool, Vec<u8>)> = None;

  loop {
    let frame = match Frame::read(stream, 64 << 20) {
      Ok(f) => f,
      Err(Error::Io(_)) => return Ok(()),
      Err(e @ Error::UnmaskedClientFrame) => {
        let _ = exchange.close(1002, b"expected a masked frame");
        return Err(e);
      }
      Err(e @ Error::Protocol(_)) => {
        let _ = exchange.close(1002, b"protocol error");
        return Err(e);
      }
      Err(e @ Error::PayloadTooLarge) => {
        let _ = exchange.close(1009, b"payload too large");
        return Err(e);
      }
      Err(e) => return Err(e),
    };

    match frame.opcode {
      OpCode::Close => {
        let (code, reason) = parse_close_payload(&frame.payload)?;
        let _ = exchange.close(1000, b"Acknowledged close");
        exchange.headers.insert("x-close-initiator", "peer");
        let _ = (code, reason);
        return Ok(());
      }
      OpCode::Ping => {
        ctx.events.ping.fire(PingEvent {
          payload_len: frame.payload.len(),
        });
        exchange.send_message(OpCode::Pong, frame.payload)?;
      }
      OpCode::Pong => {
        ctx.events.pong.fire(PongEvent {
          payload_len: frame.payload.len(),
        });
      }
      OpCode::Continuation => {
        let Some((opcode, rsv1, mut buf)) = assembling.take() else {
          return Err(Error::protocol("continuation frame with no prior frame"));
        };
        buf.extend_from_slice(&frame.payload);
        if frame.fin {
          dispatch_message(exchange, ctx, opcode, rsv1, buf)?;
        } else {
          assembling = Some((opcode, rsv1, buf));
        }
      }
      OpCode::Text | OpCode::Binary => {
        if frame.fin {
          dispatch_message(exchange, ctx, frame.opcode, frame.rsv1, frame.payload)?;
        } else {
          assembling = Some((frame.opcode, frame.rsv1, frame.payload));
        }
      }
    }
  }
}

fn parse_close_payload(payload: &[u8]) -> Result<(Option<u16>, Option<String>)> {
  if payload.is_empty() {
    return Ok((None, None));
  }
  if payload.len() < 2 {
    return Err(Error::protocol("close frame payload shorter than 2 bytes"));
  }
  let code = u16::from_be_bytes([payload[0], payload[1]]);
  let reason = std::str::from_utf8(&payload[2..])
    .map_err(|_| Error::protocol("close reason is not valid UTF-8"))?
    .to_string();
  Ok((Some(code), Some(reason)))
}

fn dispatch_message(
  exchange: &mut WsExchange,
  ctx: &FrameworkContext,
  opcode: OpCode,
  rsv1: bool,
  payload: Vec<u8>,
) -> Result<()> {
  let payload = if rsv1 {
    decompress_payload(&payload, exchange.deflate())?
  } else {
    payload
  };

  let matches = ctx.registry.resolve_ws(
    &exchange.path,
    &exchange.host,
    &exchange.headers,
    Some(opcode),
  );

  let mut cache = DispatchCache::new();
  for (mapping, captures) in matches {
    let args = match crate::transformer::run_pipeline(&mapping.transformers, &captures, &mut cache) {
      Ok(args) => args,
      Err(TransformerException(message)) => {
        log::error!("websocket transformer failed on {}: {message}", exchange.path);
        let _ = exchange.close(1011, message.as_bytes());
        return Err(Error::protocol(message));
      }
    };
    if let Err(e) = mapping.handler.call(exchange, &payload, &args) {
      log::error!("websocket handler error on {}: {e}", exchange.path);
    }
  }
  Ok(())
}

impl WsExchange {
  fn deflate(&self) -> &DeflateConfig {
    &self.deflate
  }
}

/// Blanket requirement so `serve` can set a read timeout without depending
/// on `std::net::TcpStream` directly (keeps this module testable against an
/// in-memory stream).
pub trait SetReadTimeout {
  fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()>;
}

impl SetReadTimeout for std::net::TcpStream {
  fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
    std::net::TcpStream::set_read_timeout(self, timeout)
  }
}

/// A duplicable handle to the same underlying socket, so the read loop and
/// the writer half (shared with `WsExchange`) can operate independently --
/// mirrors `std::net::TcpStream::try_clone`.
pub trait TryCloneStream: Sized {
  fn try_clone(&self) -> std::io::Result<Self>;
}

impl TryCloneStream for std::net::TcpStream {
  fn try_clone(&self) -> std::io::Result<Self> {
    std::net::TcpStream::try_clone(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fragmenting_short_payload_yields_one_frame_with_fin() {
    let frames = fragment(OpCode::Text, false, b"hi", 1024);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].fin);
    assert_eq!(frames[0].opcode, OpCode::Text);
  }

  #[test]
  fn fragmenting_long_payload_yields_continuation_chain() {
    let payload = vec![0u8; 25];
    let frames = fragment(OpCode::Binary, false, &payload, 10);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].opcode, OpCode::Binary);
    assert!(!frames[0].fin);
    assert_eq!(frames[1].opcode, OpCode::Continuation);
    assert!(!frames[1].fin);
    assert_eq!(frames[2].opcode, OpCode::Continuation);
    assert!(frames[2].fin);
  }

  #[test]
  fn rsv1_only_set_on_first_fragment() {
    let payload = vec![1u8; 25];
    let frames = fragment(OpCode::Text, true, &payload, 10);
    assert!(frames[0].rsv1);
    assert!(!frames[1].rsv1);
    assert!(!frames[2].rsv1);
  }

  #[test]
  fn close_payload_without_code_is_allowed() {
    let (code, reason) = parse_close_payload(&[]).unwrap();
    assert!(code.is_none());
    assert!(reason.is_none());
  }

  #[test]
  fn close_payload_with_code_and_reason_parses() {
    let mut payload = 1000u16.to_be_bytes().to_vec();
    payload.extend_from_slice(b"bye");
    let (code, reason) = parse_close_payload(&payload).unwrap();
    assert_eq!(code, Some(1000));
    assert_eq!(reason.as_deref(), Some("bye"));
  }

  #[test]
  fn reserved_close_code_is_rejected_as_invalid_state() {
    let status = Arc::new(Mutex::new(ConnectionStatus::Dispatching));
    let sink: Arc<Mutex<dyn Write + Send>> = Arc::new(Mutex::new(Vec::<u8>::new()));
    let mut exchange = WsExchange {
      path: "chat".to_string(),
      host: "example.com".to_string(),
      remote_ip: "127.0.0.1".to_string(),
      headers: HeaderMap::new(),
      negotiated_extensions: Vec::new(),
      fragmentation: FragmentationPolicy::default(),
      scratch: Scratch::new(),
      events: crate::events::EventBus::new(),
      writer: sink,
      status,
      deflate: DeflateConfig::default(),
    };
    assert!(matches!(exchange.close(1005, b""), Err(Error::InvalidState(_))));
  }

  fn test_exchange() -> (WsExchange, Arc<Mutex<Vec<u8>>>) {
    let status = Arc::new(Mutex::new(ConnectionStatus::Dispatching));
    let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
    let writer: Arc<Mutex<dyn Write + Send>> = sink.clone();
    let exchange = WsExchange {
      path: "chat".to_string(),
      host: "example.com".to_string(),
      remote_ip: "127.0.0.1".to_string(),
      headers: HeaderMap::new(),
      negotiated_extensions: Vec::new(),
      fragmentation: FragmentationPolicy::default(),
      scratch: Scratch::new(),
      events: crate::events::EventBus::new(),
      writer,
      status,
      deflate: DeflateConfig::default(),
    };
    (exchange, sink)
  }

  #[test]
  fn unknown_opcode_closes_with_protocol_error() {
    let (mut exchange, sink) = test_exchange();
    // FIN=1, opcode=0xB (unknown); MASK=1, len=0.
    let mut stream = std::io::Cursor::new(vec![0x8B, 0x80]);
    let ctx = FrameworkContext::default();
    let result = read_loop(&mut stream, &mut exchange, &ctx);
    assert!(matches!(result, Err(Error::Protocol(_))));
    let sent = sink.lock().unwrap();
    assert_eq!(&sent[0..2], &[0x88, 0x02]);
    assert_eq!(u16::from_be_bytes([sent[2], sent[3]]), 1002);
  }

  #[test]
  fn oversized_length_closes_with_payload_too_large() {
    let (mut exchange, sink) = test_exchange();
    // FIN=1, opcode=binary; MASK=1, len=127 (8-byte extended length).
    let mut bytes = vec![0x82, 0xFF];
    bytes.extend_from_slice(&(1u64 << 31).to_be_bytes());
    let mut stream = std::io::Cursor::new(bytes);
    let ctx = FrameworkContext::default();
    let result = read_loop(&mut stream, &mut exchange, &ctx);
    assert!(matches!(result, Err(Error::PayloadTooLarge)));
    let sent = sink.lock().unwrap();
    assert_eq!(&sent[0..2], &[0x88, 0x02]);
    assert_eq!(u16::from_be_bytes([sent[2], sent[3]]), 1009);
  }
}
