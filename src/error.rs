//! Error taxonomy (spec §7).
//!
//! Every fallible public operation in the crate returns [`Result<T>`]. Each
//! variant here maps to exactly one row of the spec's error table and the
//! dispatcher (`dispatcher.rs`, `websocket/connection.rs`) knows how to turn
//! it into the "visible behavior" column.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// No route matched the request. Visible as a 404 JSON body.
  #[error("not found")]
  NotFound,

  /// A share request resolved outside of its root, or the canonical path
  /// could not be computed. Visible as a 403 HTML page.
  #[error("forbidden: {0}")]
  Forbidden(String),

  /// A mutation was attempted after the response was frozen, a body was
  /// written for a method that forbids one, or an application selected a
  /// reserved WebSocket close code.
  #[error("invalid state: {0}")]
  InvalidState(String),

  /// A transformer raised while converting a captured path segment.
  #[error("transformer failed for parameter `{parameter}`: {message}")]
  TransformerFailure { parameter: String, message: String },

  /// A WebSocket frame declared a payload length over 2^31-1.
  #[error("payload too large")]
  PayloadTooLarge,

  /// A WebSocket frame violated RFC 6455 framing rules.
  #[error("protocol error: {0}")]
  Protocol(String),

  /// A client-to-server WebSocket frame arrived without the MASK bit set
  /// (RFC 6455 §5.1 requires it). Closed with code 1002.
  #[error("received an unmasked client frame")]
  UnmaskedClientFrame,

  /// A route pattern failed to compile (duplicate parameter name, unknown
  /// type, or an unanchored template).
  #[error("pattern error: {0}")]
  Pattern(#[from] crate::pattern::PatternError),

  /// `RouteRegistry::register` was called with a mapping that is an exact
  /// duplicate of an existing one.
  #[error("duplicate route")]
  DuplicateRoute,

  /// TLS certificate/key loading failed.
  #[error("tls error: {0}")]
  Tls(String),

  /// A handler raised an uncaught error. The dispatcher assigns it an
  /// opaque id before logging the full detail and responding.
  #[error("unexpected handler error [{id}]: {message}")]
  Unexpected { id: String, message: String },

  /// Socket or disk I/O failure. Dispatched requests close silently (1006
  /// for WebSocket); HTTP responses that haven't flushed headers yet get a
  /// best-effort 500.
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl Error {
  pub fn invalid_state(msg: impl Into<String>) -> Self {
    Error::InvalidState(msg.into())
  }

  pub fn forbidden(msg: impl Into<String>) -> Self {
    Error::Forbidden(msg.into())
  }

  pub fn protocol(msg: impl Into<String>) -> Self {
    Error::Protocol(msg.into())
  }

  /// Generates an opaque error id (not a secret, just a correlation token
  /// for logs <-> response body) and wraps a handler panic/error.
  pub fn unexpected(message: impl Into<String>) -> Self {
    use rand::Rng;
    let id: String = rand::thread_rng()
      .sample_iter(rand::distributions::Alphanumeric)
      .take(12)
      .map(char::from)
      .collect();
    Error::Unexpected {
      id,
      message: message.into(),
    }
  }
}

/// Close codes an application is forbidden from selecting directly (spec
/// §4.I: "a reserved internal range MUST NOT be selectable by applications").
pub const RESERVED_CLOSE_RANGE: std::ops::Range<u16> = 1004..1007;

pub fn check_close_code_selectable(code: u16) -> Result<()> {
  if RESERVED_CLOSE_RANGE.contains(&code) {
    return Err(Error::invalid_state(format!(
      "close code {code} is in the reserved internal range"
    )));
  }
  Ok(())
}
