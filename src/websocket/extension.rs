//! `permessage-deflate` (spec §6): the only extension both sides negotiate.
//! Compression/decompression is built on `miniz_oxide`, the exact crate the
//! teacher already pulled in for its own (client-frame) inflate path
//! (`examples/willrnch-fastwebsockets/src/lib.rs`'s `inflate_payload`). The
//! compress side has no teacher counterpart (the teacher only ever decodes
//! client frames), so it reaches one level down to `deflate::core`, the
//! tinfl-style counterpart of the `inflate::stream` API the teacher already
//! uses, and drives it with a sync flush instead of a final block.

use crate::error::{Error, Result};
use miniz_oxide::deflate::core::{
  compress, create_comp_flags_from_zip_params, CompressorOxide, TDEFLFlush,
};
use miniz_oxide::inflate::stream::{inflate, InflateState};
use miniz_oxide::{DataFormat, MZFlush};

/// The four trailing bytes every deflate block ends with, which the sender
/// strips and the receiver re-appends before inflating (spec §6).
const TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

#[derive(Debug, Clone)]
pub struct DeflateConfig {
  pub min_size: usize,
  pub max_decompressed_size: usize,
  pub level: u8,
}

impl Default for DeflateConfig {
  fn default() -> Self {
    DeflateConfig {
      min_size: 512,
      max_decompressed_size: 100 << 20,
      level: 6,
    }
  }
}

/// Compresses `payload` with a sync flush (not a final block) and strips the
/// trailing empty-block marker that flush leaves behind, per spec §6: "Final
/// compressed frame appends the standard 0x00 0x00 0xFF 0xFF block and a
/// single padding byte (0x00) before deflation ends" -- i.e. the wire form
/// omits that trailer, leaving the receiver to re-append it.
pub fn compress_payload(payload: &[u8], config: &DeflateConfig) -> Vec<u8> {
  let flags = create_comp_flags_from_zip_params(config.level as i32, -15, 0);
  let mut compressor = CompressorOxide::new(flags);
  let mut out = vec![0u8; payload.len() + payload.len() / 2 + 256];

  let (_status, _bytes_in, bytes_out) = compress(&mut compressor, payload, &mut out, TDEFLFlush::Sync);
  out.truncate(bytes_out);

  if out.ends_with(&TRAILER) {
    out.truncate(out.len() - TRAILER.len());
  }
  out
}

/// Re-appends the trailer and inflates, capping output at
/// `max_decompressed_size` (spec §6 cap, §4.N defaults mirrored here). Uses
/// `MZFlush::Partial`, not `Finish`, since the reconstructed stream ends on a
/// sync-flush boundary rather than a final block -- the same flush the
/// teacher's `inflate_payload` uses for the identical reason.
pub fn decompress_payload(payload: &[u8], config: &DeflateConfig) -> Result<Vec<u8>> {
  let mut input = payload.to_vec();
  input.extend_from_slice(&TRAILER);

  let mut out = vec![0u8; (payload.len() * 4).clamp(256, config.max_decompressed_size)];
  let mut state = InflateState::new_boxed(DataFormat::Raw);
  let result = inflate(&mut state, &input, &mut out, MZFlush::Partial);

  match result.status {
    Ok(_) => {
      out.truncate(result.bytes_written);
      if out.len() > config.max_decompressed_size {
        return Err(Error::protocol("decompressed payload exceeds configured cap"));
      }
      Ok(out)
    }
    Err(_) => Err(Error::protocol("permessage-deflate inflate failed")),
  }
}
