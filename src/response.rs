//! HTTP response writer (spec §4.F): status/headers/body, cookies, CORS,
//! stream-encoder chain. Headers freeze on first body write; any mutation
//! after that raises [`Error::InvalidState`] (spec §8 property 6).

use crate::cookie::Cookie;
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Cross-origin policy applied on first flush (spec §4.F, §8 property 10).
/// When `None` on the response, no `Access-Control-*` headers are added.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
  pub allowed_origins: Vec<String>,
  pub allowed_methods: Vec<String>,
  pub allowed_headers: Vec<String>,
  pub allow_credentials: bool,
  pub max_age: Option<u32>,
}

impl CorsPolicy {
  fn apply(&self, headers: &mut HeaderWriter) {
    let origin = if self.allowed_origins.iter().any(|o| o == "*") {
      "*".to_string()
    } else {
      self.allowed_origins.join(", ")
    };
    if !origin.is_empty() {
      headers.set_raw("access-control-allow-origin", origin);
    }
    if !self.allowed_methods.is_empty() {
      headers.set_raw(
        "access-control-allow-methods",
        self.allowed_methods.join(", "),
      );
    }
    if !self.allowed_headers.is_empty() {
      headers.set_raw(
        "access-control-allow-headers",
        self.allowed_headers.join(", "),
      );
    }
    if self.allow_credentials {
      headers.set_raw("access-control-allow-credentials", "true");
    }
    if let Some(max_age) = self.max_age {
      headers.set_raw("access-control-max-age", max_age.to_string());
    }
  }
}

/// A simple ordered header multimap private to the response writer (kept
/// distinct from `request::HeaderMap` since it tracks freeze state).
#[derive(Debug, Clone, Default)]
struct HeaderWriter {
  entries: Vec<(String, String)>,
}

impl HeaderWriter {
  fn set_raw(&mut self, name: &str, value: impl Into<String>) {
    let key = name.to_ascii_lowercase();
    self.entries.retain(|(k, _)| *k != key);
    self.entries.push((key, value.into()));
  }

  fn add_raw(&mut self, name: &str, value: impl Into<String>) {
    self.entries.push((name.to_ascii_lowercase(), value.into()));
  }

  fn has(&self, name: &str) -> bool {
    let key = name.to_ascii_lowercase();
    self.entries.iter().any(|(k, _)| *k == key)
  }
}

/// Paired 1:1 with a `Request` (spec §3). Mutable until headers flush.
pub struct Response {
  status: u16,
  headers: HeaderWriter,
  cookies: Vec<Cookie>,
  pub cors: Option<CorsPolicy>,
  encoder: Encoding,
  flushed: bool,
  sending_file: bool,
  can_carry_body: bool,
  pretty_json: bool,
  out: Vec<u8>,
}

impl Response {
  pub fn new(can_carry_body: bool) -> Self {
    let mut headers = HeaderWriter::default();
    headers.set_raw("content-type", "application/json");
    Response {
      status: 200,
      headers,
      cookies: Vec::new(),
      cors: None,
      encoder: Encoding::Identity,
      flushed: false,
      sending_file: false,
      can_carry_body,
      pretty_json: false,
      out: Vec::new(),
    }
  }

  /// Set from the paired request's `?format=pretty` query flag (spec §4.G:
  /// "Requests that request `?format=pretty` receive pretty-printed JSON").
  pub fn set_pretty_json(&mut self, pretty: bool) {
    self.pretty_json = pretty;
  }

  /// Serializes `value` as the body, honoring the pretty-print flag.
  pub fn print_json(&mut self, value: &serde_json::Value) -> Result<()> {
    let rendered = if self.pretty_json {
      serde_json::to_vec_pretty(value)
    } else {
      serde_json::to_vec(value)
    }
    .map_err(|e| Error::protocol(e.to_string()))?;
    self.print_bytes(&rendered)
  }

  fn ensure_mutable(&self) -> Result<()> {
    if self.flushed {
      return Err(Error::invalid_state(
        "cannot modify response after headers were flushed",
      ));
    }
    Ok(())
  }

  pub fn set_status(&mut self, status: u16) -> Result<()> {
    self.ensure_mutable()?;
    self.status = status;
    Ok(())
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
    self.ensure_mutable()?;
    self.headers.set_raw(name, value);
    Ok(())
  }

  pub fn add_header(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
    self.ensure_mutable()?;
    self.headers.add_raw(name, value);
    Ok(())
  }

  pub fn set_cookie(&mut self, cookie: Cookie) -> Result<()> {
    self.ensure_mutable()?;
    self.cookies.push(cookie);
    Ok(())
  }

  pub fn set_stream_encoder(&mut self, encoder: Encoding) -> Result<()> {
    self.ensure_mutable()?;
    self.encoder = encoder;
    Ok(())
  }

  fn assert_can_write_body(&self) -> Result<()> {
    if self.sending_file {
      return Err(Error::invalid_state(
        "a file is already being sent on this response",
      ));
    }
    if !self.can_carry_body {
      return Err(Error::invalid_state(
        "this request's method forbids a response body",
      ));
    }
    Ok(())
  }

  /// Writes a complete in-memory body. `Content-Length` is known up front
  /// so no chunked transfer is needed.
  pub fn print_bytes(&mut self, bytes: &[u8]) -> Result<()> {
    self.assert_can_write_body()?;
    let encoded = self.encoder.encode(bytes)?;
    self.flush_headers(Some(encoded.len() as u64))?;
    self.out.extend_from_slice(&encoded);
    Ok(())
  }

  /// Writes a body of unknown total length by switching to
  /// `Transfer-Encoding: chunked` (spec §4.F, §6).
  pub fn print_stream<R: Read>(&mut self, mut stream: R) -> Result<()> {
    self.assert_can_write_body()?;
    self.flush_headers(None)?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    let encoded = self.encoder.encode(&buf)?;
    self.out.extend_from_slice(&encoded);
    Ok(())
  }

  /// Streams a file's contents and marks `sendingFile`, after which no
  /// further body writes are permitted (spec §3).
  pub fn print_file(&mut self, path: &std::path::Path) -> Result<()> {
    self.assert_can_write_body()?;
    let metadata = std::fs::metadata(path)?;
    let mut file = std::fs::File::open(path)?;
    if self.encoder == Encoding::Identity {
      self.flush_headers(Some(metadata.len()))?;
      std::io::copy(&mut file, &mut self.out)?;
    } else {
      self.flush_headers(None)?;
      let mut raw = Vec::new();
      file.read_to_end(&mut raw)?;
      let encoded = self.encoder.encode(&raw)?;
      self.out.extend_from_slice(&encoded);
    }
    self.sending_file = true;
    Ok(())
  }

  /// Closes the response, flushing untouched headers with an empty body
  /// if nothing was ever written (spec §4.G step 10).
  pub fn close(&mut self) -> Result<()> {
    if !self.flushed {
      self.flush_headers(Some(0))?;
    }
    Ok(())
  }

  fn flush_headers(&mut self, content_length: Option<u64>) -> Result<()> {
    self.ensure_mutable()?;
    for cookie in &self.cookies {
      self.headers.add_raw("set-cookie", cookie.to_header_value());
    }
    if let Some(cors) = self.cors.clone() {
      cors.apply(&mut self.headers);
    }
    if let Some(token) = self.encoder.header_token() {
      self.headers.set_raw("content-encoding", token);
    }
    match content_length {
      Some(len) => {
        self.headers.set_raw("content-length", len.to_string());
      }
      None => {
        self.headers.set_raw("transfer-encoding", "chunked");
      }
    }
    self.flushed = true;
    Ok(())
  }

  pub fn is_flushed(&self) -> bool {
    self.flushed
  }

  pub fn is_sending_file(&self) -> bool {
    self.sending_file
  }

  /// Renders the status line + headers for the wire writer (`server.rs`).
  pub fn render_head(&self, reason: &str) -> String {
    let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
    for (name, value) in &self.headers.entries {
      out.push_str(name);
      out.push_str(": ");
      out.push_str(value);
      out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out
  }

  pub fn body(&self) -> &[u8] {
    &self.out
  }

  pub fn header_value(&self, name: &str) -> Option<&str> {
    let key = name.to_ascii_lowercase();
    self.headers
      .entries
      .iter()
      .find(|(k, _)| *k == key)
      .map(|(_, v)| v.as_str())
  }

  pub fn has_header(&self, name: &str) -> bool {
    self.headers.has(name)
  }
}
