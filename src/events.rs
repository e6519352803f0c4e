//! Event bus surface (spec §4 component N): a synchronous, cancellable
//! publish/subscribe bus consumed by the HTTP dispatcher (§4.G), the
//! WebSocket connection machine (§4.I), and the share handler (§4.K).
//!
//! Listeners run on the calling worker (spec §5: "synchronous event
//! dispatch... listeners run on the calling worker"). This is a narrow,
//! in-scope subset of what the distilled spec calls an "event-listener
//! registry" elsewhere and marks out of scope — a generic addon/plugin
//! loader built atop this bus is *not* provided here.

use std::sync::{Arc, Mutex};

/// A hook point that listeners can cancel. Once cancelled, the caller that
/// fired the event is expected to stop further processing (see
/// `dispatcher.rs` step 6, `websocket/connection.rs` outgoing send).
#[derive(Debug, Clone, Copy, Default)]
pub struct Cancellable {
  cancelled: bool,
}

impl Cancellable {
  pub fn cancel(&mut self) {
    self.cancelled = true;
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled
  }
}

/// Marker trait for event payloads. Implemented for the built-in event
/// types below; applications may define their own for custom buses.
pub trait Event: Send + Sync + 'static {}

type Listener<E> = Box<dyn Fn(&mut E) + Send + Sync>;

/// A single-event-type bus. `EventBus` (below) composes one of these per
/// built-in event type; nothing stops an embedding application from holding
/// its own `Channel<CustomEvent>` for bespoke hook points.
pub struct Channel<E> {
  listeners: Mutex<Vec<Listener<E>>>,
}

impl<E> Channel<E> {
  pub fn new() -> Self {
    Channel {
      listeners: Mutex::new(Vec::new()),
    }
  }

  pub fn subscribe<F>(&self, listener: F)
  where
    F: Fn(&mut E) + Send + Sync + 'static,
  {
    self.listeners.lock().unwrap().push(Box::new(listener));
  }

  /// Fires the event, running every listener in subscription order on the
  /// calling thread. Returns the (possibly mutated) event back to the
  /// caller so it can inspect cancellation/overrides.
  pub fn fire(&self, mut event: E) -> E {
    let listeners = self.listeners.lock().unwrap();
    for listener in listeners.iter() {
      listener(&mut event);
    }
    event
  }
}

impl<E> Default for Channel<E> {
  fn default() -> Self {
    Self::new()
  }
}

/// Fired before dispatch begins for an HTTP request. Cancelling stops the
/// dispatcher before any endpoint runs (spec §4.G step 6).
pub struct RequestEvent {
  pub path: String,
  pub method: String,
  pub cancel: Cancellable,
}
impl Event for RequestEvent {}

/// Fired for each outgoing WebSocket frame before fragmentation/extension
/// encoding (spec §4.I "Outgoing send"). Cancelling drops the frame.
pub struct OutgoingSocketMessageEvent {
  pub opcode: crate::websocket::frame::OpCode,
  pub payload_len: usize,
  pub cancel: Cancellable,
}
impl Event for OutgoingSocketMessageEvent {}

/// Fired when a PING frame is received (spec §4.I).
pub struct PingEvent {
  pub payload_len: usize,
}
impl Event for PingEvent {}

/// Fired when a PONG frame is received (spec §4.I).
pub struct PongEvent {
  pub payload_len: usize,
}
impl Event for PongEvent {}

/// Fired once a share file has been resolved and read into memory, letting
/// listeners replace the bytes or override the detected content type
/// before it streams out (spec §4.K).
pub struct ShareFileLoadedEvent {
  pub path: std::path::PathBuf,
  pub content_type: String,
  pub bytes: Option<Vec<u8>>,
}
impl Event for ShareFileLoadedEvent {}

/// The framework's built-in hook points. Held inside [`crate::context::FrameworkContext`]
/// and shared (`Arc`) across every worker thread.
#[derive(Default)]
pub struct EventBus {
  pub request: Channel<RequestEvent>,
  pub outgoing_socket_message: Channel<OutgoingSocketMessageEvent>,
  pub ping: Channel<PingEvent>,
  pub pong: Channel<PongEvent>,
  pub share_file_loaded: Channel<ShareFileLoadedEvent>,
}

impl EventBus {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }
}
