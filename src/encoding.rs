//! Stream encoder chain (spec §4.F): selects the `Content-Encoding` applied
//! to a response body. `identity` is the default; the others are grounded on
//! the same crates the WebSocket permessage-deflate extension and the
//! pack's gateway repos already pull in.

use crate::error::{Error, Result};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
  Identity,
  Gzip,
  Deflate,
  Zstd,
}

impl Encoding {
  /// The `Content-Encoding` token, or `None` for identity which is
  /// omitted entirely per spec §6.
  pub fn header_token(&self) -> Option<&'static str> {
    match self {
      Encoding::Identity => None,
      Encoding::Gzip => Some("gzip"),
      Encoding::Deflate => Some("deflate"),
      Encoding::Zstd => Some("zstd"),
    }
  }

  pub fn from_accept_encoding(header: &str) -> Vec<Encoding> {
    header
      .split(',')
      .filter_map(|tok| {
        let tok = tok.split(';').next().unwrap_or("").trim();
        match tok {
          "gzip" => Some(Encoding::Gzip),
          "deflate" => Some(Encoding::Deflate),
          "zstd" => Some(Encoding::Zstd),
          "identity" => Some(Encoding::Identity),
          _ => None,
        }
      })
      .collect()
  }

  pub fn encode(&self, raw: &[u8]) -> Result<Vec<u8>> {
    match self {
      Encoding::Identity => Ok(raw.to_vec()),
      Encoding::Gzip => {
        let mut encoder =
          flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(raw)?;
        encoder.finish().map_err(Error::from)
      }
      Encoding::Deflate => Ok(miniz_oxide::deflate::compress_to_vec_zlib(raw, 6)),
      Encoding::Zstd => zstd::stream::encode_all(raw, 0)
        .map_err(Error::from),
    }
  }
}
