//! Opening handshake (spec §4.I): reads the HTTP upgrade request line and
//! headers, computes `Sec-WebSocket-Accept`, negotiates extensions, and
//! renders the `101 Switching Protocols` response. Accept-key computation
//! reuses the teacher's choice of the `sha1` + `base64` crates
//! (`examples/willrnch-fastwebsockets` depends on both for the same
//! purpose, upstream in the `handshake` feature module).

use crate::error::{Error, Result};
use crate::request::HeaderMap;
use base64::Engine;
use sha1::{Digest, Sha1};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(SHA-1(key + GUID))`, per RFC 6455 §1.3.
pub fn compute_accept(key: &str) -> String {
  let mut hasher = Sha1::new();
  hasher.update(key.as_bytes());
  hasher.update(GUID.as_bytes());
  let digest = hasher.finalize();
  base64::engine::general_purpose::STANDARD.encode(digest)
}

pub struct HandshakeRequest {
  pub path: String,
  pub host: String,
  pub key: String,
  pub extensions: Vec<String>,
}

/// Parses the request line + headers, extracting the pieces the upgrade
/// machine needs; fails if `Sec-WebSocket-Key` is missing or the request
/// doesn't ask to upgrade.
pub fn parse_request(request_line: &str, headers: &HeaderMap) -> Result<HandshakeRequest> {
  let mut parts = request_line.split_whitespace();
  let _method = parts.next();
  let target = parts
    .next()
    .ok_or_else(|| Error::protocol("malformed request line"))?;

  if !headers
    .get("upgrade")
    .map(|v| v.eq_ignore_ascii_case("websocket"))
    .unwrap_or(false)
  {
    return Err(Error::protocol("missing or invalid Upgrade header"));
  }
  if !headers
    .get("connection")
    .map(|v| v.to_ascii_lowercase().contains("upgrade"))
    .unwrap_or(false)
  {
    return Err(Error::protocol("missing or invalid Connection header"));
  }

  let key = headers
    .get("sec-websocket-key")
    .ok_or_else(|| Error::protocol("missing Sec-WebSocket-Key"))?
    .to_string();
  let host = headers.get("host").unwrap_or("").to_string();
  let extensions = headers
    .get("sec-websocket-extensions")
    .map(|v| v.split(',').map(|e| e.trim().to_string()).collect())
    .unwrap_or_default();

  Ok(HandshakeRequest {
    path: target.trim_matches('/').to_string(),
    host,
    key,
    extensions,
  })
}

/// Negotiates the extensions the client offered against the ones the server
/// supports, preserving offered order, then reverses the final list so the
/// last-negotiated extension encodes outermost and decodes innermost (spec
/// §4.I: "the final extension list is reversed").
pub fn negotiate_extensions(offered: &[String], supported: &[&str]) -> Vec<String> {
  let mut negotiated: Vec<String> = offered
    .iter()
    .filter_map(|token| {
      let name = token.split(';').next().unwrap_or("").trim();
      supported
        .iter()
        .find(|s| **s == name)
        .map(|s| s.to_string())
    })
    .collect();
  negotiated.reverse();
  negotiated
}

pub fn render_response(accept: &str, extensions: &[String]) -> String {
  let mut out = String::new();
  out.push_str("HTTP/1.1 101 Switching Protocols\r\n");
  out.push_str("Upgrade: websocket\r\n");
  out.push_str("Connection: Upgrade\r\n");
  out.push_str(&format!("Sec-WebSocket-Accept: {accept}\r\n"));
  if !extensions.is_empty() {
    out.push_str(&format!(
      "Sec-WebSocket-Extensions: {}\r\n",
      extensions.join(", ")
    ));
  }
  out.push_str("\r\n");
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accept_key_matches_rfc6455_fixture() {
    assert_eq!(
      compute_accept("dGhlIHNhbXBsZSBub25jZQ=="),
      "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
  }

  #[test]
  fn parse_request_rejects_missing_upgrade_header() {
    let headers = HeaderMap::new();
    let err = parse_request("GET /chat HTTP/1.1", &headers).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
  }

  #[test]
  fn parse_request_extracts_path_and_key() {
    let mut headers = HeaderMap::new();
    headers.insert("upgrade", "websocket");
    headers.insert("connection", "Upgrade");
    headers.insert("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
    headers.insert("host", "example.com");
    let parsed = parse_request("GET /chat HTTP/1.1", &headers).unwrap();
    assert_eq!(parsed.path, "chat");
    assert_eq!(parsed.key, "dGhlIHNhbXBsZSBub25jZQ==");
    assert_eq!(parsed.host, "example.com");
  }

  #[test]
  fn extension_negotiation_preserves_offer_order_then_reverses() {
    let offered = vec!["permessage-deflate".to_string(), "unsupported-ext".to_string()];
    let negotiated = negotiate_extensions(&offered, &["permessage-deflate"]);
    assert_eq!(negotiated, vec!["permessage-deflate".to_string()]);
  }
}
