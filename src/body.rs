//! Request body reader/buffer (spec §4.E).
//!
//! The body is streamed into a per-request temp file as it's read off the
//! socket (2 KiB buffer, owner-only permissions where the platform supports
//! it) and exposed afterwards as one of several lazily-parsed variants. The
//! temp file itself is a `tempfile::NamedTempFile`, grounded on
//! `hdds-team-hdds`'s own use of the `tempfile` crate for exactly this kind
//! of scratch file (its `tempfile` is registered for best-effort removal on
//! drop, which stands in for "deletion on process exit").

use crate::error::{Error, Result};
use crate::request::HeaderMap;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const COPY_CHUNK: usize = 2048;

/// Owns the temp file (if any) backing a request body. Dropping it deletes
/// the file; `rawBody()` callers get a fresh sequential reader instead of
/// sharing a cursor.
pub struct BodyHandle {
  file: Option<NamedTempFile>,
  size: u64,
}

impl BodyHandle {
  pub fn empty() -> Self {
    BodyHandle {
      file: None,
      size: 0,
    }
  }

  pub fn has_body(&self) -> bool {
    self.file.is_some()
  }

  pub fn size(&self) -> u64 {
    self.size
  }

  /// Streams `total_len` bytes from `source` into a fresh temp file
  /// located under `temp_dir`. If `total_len` is `Some(0)` (or the source
  /// yields nothing), no file is created and `has_body()` is `false`.
  pub fn buffer_from_reader<R: Read>(
    mut source: R,
    total_len: Option<u64>,
    temp_dir: &Path,
  ) -> Result<Self> {
    if total_len == Some(0) {
      return Ok(BodyHandle::empty());
    }

    let mut tmp = tempfile::Builder::new()
      .prefix("embercore-body-")
      .tempfile_in(temp_dir)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let file = tmp.as_file();
      let mut perms = file.metadata()?.permissions();
      perms.set_mode(0o600);
      file.set_permissions(perms)?;
    }

    let mut buf = [0u8; COPY_CHUNK];
    let mut written: u64 = 0;
    loop {
      let want = match total_len {
        Some(len) => {
          let remaining = len.saturating_sub(written);
          if remaining == 0 {
            break;
          }
          remaining.min(COPY_CHUNK as u64) as usize
        }
        None => COPY_CHUNK,
      };
      if want == 0 {
        break;
      }
      let n = source.read(&mut buf[..want])?;
      if n == 0 {
        break;
      }
      tmp.write_all(&buf[..n])?;
      written += n as u64;
    }
    tmp.flush()?;

    if written == 0 {
      return Ok(BodyHandle::empty());
    }

    Ok(BodyHandle {
      file: Some(tmp),
      size: written,
    })
  }

  /// A fresh sequential reader over the buffered body, starting at byte 0.
  pub fn raw_body(&self) -> Result<Vec<u8>> {
    match &self.file {
      None => Ok(Vec::new()),
      Some(tmp) => {
        let mut file = tmp.reopen()?;
        let mut buf = Vec::with_capacity(self.size as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
      }
    }
  }

  pub fn path(&self) -> Option<&std::path::Path> {
    self.file.as_ref().map(|f| f.path())
  }
}

/// Chooses the parsed temp directory per spec §6: system temp if it has at
/// least 250MB free, or an explicit override/`./temp/` otherwise.
pub fn resolve_temp_dir(override_dir: Option<&Path>, min_free_bytes: u64) -> PathBuf {
  if let Some(dir) = override_dir {
    return dir.to_path_buf();
  }

  let system_temp = std::env::temp_dir();
  if has_enough_free_space(&system_temp, min_free_bytes) {
    system_temp
  } else {
    PathBuf::from("./temp/")
  }
}

/// `statvfs` (unix) / `GetDiskFreeSpaceEx` (windows) via `fs4`, the same
/// crate family `tempfile` itself leans on for platform-specific filesystem
/// queries. Missing or unreadable mounts fail open, per spec §6: the caller
/// falls back to `./temp/` only on a confirmed shortfall, not an unknown.
fn has_enough_free_space(dir: &Path, min_free_bytes: u64) -> bool {
  match fs4::available_space(dir) {
    Ok(available) => available >= min_free_bytes,
    Err(_) => true,
  }
}

/// Tagged body variant, replacing the source's `instanceof` chain (spec §9
/// re-architecture item: "instance-of chains for body variants become a
/// tagged variant").
#[derive(Debug, Clone)]
pub enum Body {
  Json(serde_json::Value),
  Form(HashMap<String, String>),
  Multipart(HashMap<String, Vec<Part>>),
  Raw(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Part {
  pub content_type: Option<String>,
  pub filename: Option<String>,
  pub data: Vec<u8>,
}

impl Body {
  pub fn is_json(&self) -> bool {
    matches!(self, Body::Json(_))
  }

  pub fn is_form(&self) -> bool {
    matches!(self, Body::Form(_))
  }

  pub fn is_multipart(&self) -> bool {
    matches!(self, Body::Multipart(_))
  }

  /// Chooses the parsing strategy from `Content-Type`, per spec §4.E.
  pub fn parse(raw: &[u8], headers: &HeaderMap) -> Result<Body> {
    let content_type = headers.get("content-type").unwrap_or("");
    if content_type.starts_with("application/json") {
      let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| Error::invalid_state(format!("malformed JSON body: {e}")))?;
      return Ok(Body::Json(value));
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
      return Ok(Body::Form(parse_form_urlencoded(raw)));
    }
    if let Some(boundary) = content_type
      .split(';')
      .find_map(|seg| seg.trim().strip_prefix("boundary="))
    {
      return Ok(Body::Multipart(parse_multipart(raw, boundary)?));
    }
    Ok(Body::Raw(raw.to_vec()))
  }
}

/// Decodes `application/x-www-form-urlencoded`. Per spec §9's flagged open
/// question, this keeps every decoded payload byte verbatim -- no trailing
/// characters are trimmed.
fn parse_form_urlencoded(raw: &[u8]) -> HashMap<String, String> {
  let text = String::from_utf8_lossy(raw);
  let mut map = HashMap::new();
  for pair in text.split('&').filter(|p| !p.is_empty()) {
    let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
    let key = urlencoding::decode(&k.replace('+', " "))
      .map(|c| c.into_owned())
      .unwrap_or_else(|_| k.to_string());
    let value = urlencoding::decode(&v.replace('+', " "))
      .map(|c| c.into_owned())
      .unwrap_or_else(|_| v.to_string());
    map.insert(key, value);
  }
  map
}

fn parse_multipart(raw: &[u8], boundary: &str) -> Result<HashMap<String, Vec<Part>>> {
  let delimiter = format!("--{boundary}").into_bytes();
  let mut parts_map: HashMap<String, Vec<Part>> = HashMap::new();

  let mut sections = split_on_delimiter(raw, &delimiter);
  // The first split chunk is preamble before the first boundary; the last
  // is the trailing `--` terminator. Drop both.
  if !sections.is_empty() {
    sections.remove(0);
  }
  if let Some(last) = sections.last() {
    if last.starts_with(b"--") {
      sections.pop();
    }
  }

  for section in sections {
    let section = trim_leading_crlf(section);
    let Some(header_end) = find_subslice(section, b"\r\n\r\n") else {
      continue;
    };
    let header_block = &section[..header_end];
    let mut body = &section[header_end + 4..];
    // Strip the trailing CRLF that precedes the next boundary.
    if body.ends_with(b"\r\n") {
      body = &body[..body.len() - 2];
    }

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in String::from_utf8_lossy(header_block).split("\r\n") {
      if let Some(rest) = line
        .to_ascii_lowercase()
        .strip_prefix("content-disposition:")
        .map(|_| line.splitn(2, ':').nth(1).unwrap_or("").trim())
      {
        for attr in rest.split(';').skip(1) {
          let attr = attr.trim();
          if let Some(v) = attr.strip_prefix("name=") {
            name = Some(unquote(v));
          } else if let Some(v) = attr.strip_prefix("filename=") {
            filename = Some(unquote(v));
          }
        }
      } else if let Some(rest) = line
        .to_ascii_lowercase()
        .strip_prefix("content-type:")
        .map(|_| line.splitn(2, ':').nth(1).unwrap_or("").trim())
      {
        content_type = Some(rest.to_string());
      }
    }

    let Some(name) = name else { continue };
    parts_map.entry(name).or_default().push(Part {
      content_type,
      filename,
      data: body.to_vec(),
    });
  }

  Ok(parts_map)
}

fn unquote(s: &str) -> String {
  s.trim_matches('"').to_string()
}

fn trim_leading_crlf(mut s: &[u8]) -> &[u8] {
  if s.starts_with(b"\r\n") {
    s = &s[2..];
  }
  s
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  haystack
    .windows(needle.len())
    .position(|window| window == needle)
}

fn split_on_delimiter<'a>(data: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
  let mut out = Vec::new();
  let mut rest = data;
  while let Some(pos) = find_subslice(rest, delimiter) {
    out.push(&rest[..pos]);
    rest = &rest[pos + delimiter.len()..];
  }
  out.push(rest);
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn empty_body_is_absent() {
    let tmp_dir = std::env::temp_dir();
    let handle = BodyHandle::buffer_from_reader(Cursor::new(Vec::new()), Some(0), &tmp_dir)
      .unwrap();
    assert!(!handle.has_body());
  }

  #[test]
  fn body_round_trips_byte_for_byte() {
    let tmp_dir = std::env::temp_dir();
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    let handle =
      BodyHandle::buffer_from_reader(Cursor::new(payload.clone()), Some(payload.len() as u64), &tmp_dir)
        .unwrap();
    assert!(handle.has_body());
    assert_eq!(handle.size(), payload.len() as u64);
    assert_eq!(handle.raw_body().unwrap(), payload);
  }

  #[test]
  fn raw_body_can_be_read_more_than_once() {
    let tmp_dir = std::env::temp_dir();
    let payload = b"hello world".to_vec();
    let handle =
      BodyHandle::buffer_from_reader(Cursor::new(payload.clone()), Some(payload.len() as u64), &tmp_dir)
        .unwrap();
    assert_eq!(handle.raw_body().unwrap(), payload);
    assert_eq!(handle.raw_body().unwrap(), payload);
  }

  #[test]
  fn parses_json_body() {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "application/json");
    let body = Body::parse(br#"{"id": 42}"#, &headers).unwrap();
    match body {
      Body::Json(v) => assert_eq!(v["id"], 42),
      _ => panic!("expected json"),
    }
  }

  #[test]
  fn parses_form_urlencoded_keeping_all_bytes() {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "application/x-www-form-urlencoded");
    let body = Body::parse(b"name=alice&greeting=hi+there", &headers).unwrap();
    match body {
      Body::Form(map) => {
        assert_eq!(map.get("name").unwrap(), "alice");
        assert_eq!(map.get("greeting").unwrap(), "hi there");
      }
      _ => panic!("expected form"),
    }
  }

  #[test]
  fn parses_multipart_text_and_binary_fields() {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "multipart/form-data; boundary=----X");
    let mut raw = Vec::new();
    raw.extend_from_slice(b"------X\r\n");
    raw.extend_from_slice(b"Content-Disposition: form-data; name=\"name\"\r\n\r\n");
    raw.extend_from_slice(b"alice\r\n");
    raw.extend_from_slice(b"------X\r\n");
    raw.extend_from_slice(
      b"Content-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n",
    );
    raw.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    raw.extend_from_slice(&[0x89, 0x50, 0x4E]);
    raw.extend_from_slice(b"\r\n------X--\r\n");

    let body = Body::parse(&raw, &headers).unwrap();
    match body {
      Body::Multipart(map) => {
        assert_eq!(map.get("name").unwrap()[0].data, b"alice");
        assert_eq!(map.get("avatar").unwrap()[0].data, vec![0x89, 0x50, 0x4E]);
      }
      _ => panic!("expected multipart"),
    }
  }
}
