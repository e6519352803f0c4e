//! Minimal HTTP/1.1 request-head reader shared by the plain dispatcher
//! (`server.rs`) and the WebSocket upgrade path (`websocket/connection.rs`).
//! Reads byte-at-a-time up to the blank line terminating headers -- simple
//! over clever, since request heads are small and this runs once per
//! connection/request, not in a hot loop.

use crate::error::{Error, Result};
use crate::request::HeaderMap;
use std::io::Read;

pub struct RequestHead {
  pub request_line: String,
  pub headers: HeaderMap,
}

fn read_line(stream: &mut impl Read) -> Result<String> {
  let mut line = Vec::new();
  let mut byte = [0u8; 1];
  loop {
    let n = stream.read(&mut byte)?;
    if n == 0 {
      if line.is_empty() {
        return Err(Error::Io(std::io::Error::new(
          std::io::ErrorKind::UnexpectedEof,
          "connection closed before request head completed",
        )));
      }
      break;
    }
    if byte[0] == b'\n' {
      break;
    }
    if byte[0] != b'\r' {
      line.push(byte[0]);
    }
  }
  Ok(String::from_utf8_lossy(&line).into_owned())
}

pub fn read_request_head(stream: &mut impl Read) -> Result<RequestHead> {
  let request_line = read_line(stream)?;
  let mut headers = HeaderMap::new();
  loop {
    let line = read_line(stream)?;
    if line.is_empty() {
      break;
    }
    if let Some((name, value)) = line.split_once(':') {
      headers.insert(name.trim(), value.trim());
    }
  }
  Ok(RequestHead {
    request_line,
    headers,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn parses_request_line_and_headers() {
    let raw = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\n\r\n";
    let mut cursor = Cursor::new(raw.to_vec());
    let head = read_request_head(&mut cursor).unwrap();
    assert_eq!(head.request_line, "GET /chat HTTP/1.1");
    assert_eq!(head.headers.get("host"), Some("example.com"));
    assert_eq!(head.headers.get("upgrade"), Some("websocket"));
  }
}
