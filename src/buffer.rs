//! `ByteBuffer` (spec §3): a mutable or read-only byte store with separate
//! read/write indices, varint/varlong support, fixed-width big-endian
//! integers, length-prefixed UTF-8 strings, and UUIDs (two `u64` halves, MSB
//! first). Built over `bytes::BytesMut`, reusing the dependency the teacher
//! crate already pulls in for frame payloads (spec §3 names this type but
//! leaves the backing store unspecified).

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
  #[error("read past end of buffer")]
  Underflow,
  #[error("fixed-size buffer is full")]
  CapacityExceeded,
  #[error("invalid utf-8 in string field")]
  InvalidUtf8,
  #[error("varint is too large")]
  VarintTooLarge,
}

pub type Result<T> = std::result::Result<T, BufferError>;

/// A read/write cursor over a byte store. If `fixed_capacity` is `Some`,
/// writes that would exceed it fail instead of growing; otherwise the
/// backing `BytesMut` reallocates-and-copies as needed (spec §3 invariant).
pub struct ByteBuffer {
  data: BytesMut,
  read_index: usize,
  fixed_capacity: Option<usize>,
  mark: Option<usize>,
}

impl ByteBuffer {
  pub fn new() -> Self {
    ByteBuffer {
      data: BytesMut::new(),
      read_index: 0,
      fixed_capacity: None,
      mark: None,
    }
  }

  pub fn with_fixed_capacity(capacity: usize) -> Self {
    ByteBuffer {
      data: BytesMut::with_capacity(capacity),
      read_index: 0,
      fixed_capacity: Some(capacity),
      mark: None,
    }
  }

  pub fn from_bytes(bytes: &[u8]) -> Self {
    ByteBuffer {
      data: BytesMut::from(bytes),
      read_index: 0,
      fixed_capacity: None,
      mark: None,
    }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn read_index(&self) -> usize {
    self.read_index
  }

  pub fn write_index(&self) -> usize {
    self.data.len()
  }

  pub fn remaining(&self) -> usize {
    self.data.len().saturating_sub(self.read_index)
  }

  pub fn mark(&mut self) {
    self.mark = Some(self.read_index);
  }

  pub fn reset_to_mark(&mut self) -> Result<()> {
    match self.mark {
      Some(m) => {
        self.read_index = m;
        Ok(())
      }
      None => Err(BufferError::Underflow),
    }
  }

  pub fn rewind(&mut self) {
    self.read_index = 0;
  }

  fn ensure_writable(&mut self, additional: usize) -> Result<()> {
    if let Some(cap) = self.fixed_capacity {
      if self.data.len() + additional > cap {
        return Err(BufferError::CapacityExceeded);
      }
    }
    self.data.reserve(additional);
    Ok(())
  }

  pub fn write_u8(&mut self, v: u8) -> Result<()> {
    self.ensure_writable(1)?;
    self.data.put_u8(v);
    Ok(())
  }

  pub fn write_u16(&mut self, v: u16) -> Result<()> {
    self.ensure_writable(2)?;
    self.data.put_u16(v);
    Ok(())
  }

  pub fn write_u32(&mut self, v: u32) -> Result<()> {
    self.ensure_writable(4)?;
    self.data.put_u32(v);
    Ok(())
  }

  pub fn write_u64(&mut self, v: u64) -> Result<()> {
    self.ensure_writable(8)?;
    self.data.put_u64(v);
    Ok(())
  }

  pub fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
    self.ensure_writable(v.len())?;
    self.data.put_slice(v);
    Ok(())
  }

  /// LEB128 variable-length unsigned 32-bit integer.
  pub fn write_varint(&mut self, mut v: u32) -> Result<()> {
    loop {
      let mut byte = (v & 0x7F) as u8;
      v >>= 7;
      if v != 0 {
        byte |= 0x80;
      }
      self.write_u8(byte)?;
      if v == 0 {
        break;
      }
    }
    Ok(())
  }

  /// LEB128 variable-length unsigned 64-bit integer.
  pub fn write_varlong(&mut self, mut v: u64) -> Result<()> {
    loop {
      let mut byte = (v & 0x7F) as u8;
      v >>= 7;
      if v != 0 {
        byte |= 0x80;
      }
      self.write_u8(byte)?;
      if v == 0 {
        break;
      }
    }
    Ok(())
  }

  pub fn write_string(&mut self, s: &str) -> Result<()> {
    self.write_varint(s.len() as u32)?;
    self.write_bytes(s.as_bytes())
  }

  pub fn write_uuid(&mut self, uuid: &Uuid) -> Result<()> {
    let bytes = uuid.as_u128().to_be_bytes();
    self.write_u64(u64::from_be_bytes(bytes[0..8].try_into().unwrap()))?;
    self.write_u64(u64::from_be_bytes(bytes[8..16].try_into().unwrap()))
  }

  fn ensure_readable(&self, n: usize) -> Result<()> {
    if self.remaining() < n {
      return Err(BufferError::Underflow);
    }
    Ok(())
  }

  pub fn read_u8(&mut self) -> Result<u8> {
    self.ensure_readable(1)?;
    let v = self.data[self.read_index];
    self.read_index += 1;
    Ok(v)
  }

  pub fn read_u16(&mut self) -> Result<u16> {
    self.ensure_readable(2)?;
    let mut chunk = &self.data[self.read_index..self.read_index + 2];
    let v = chunk.get_u16();
    self.read_index += 2;
    Ok(v)
  }

  pub fn read_u32(&mut self) -> Result<u32> {
    self.ensure_readable(4)?;
    let mut chunk = &self.data[self.read_index..self.read_index + 4];
    let v = chunk.get_u32();
    self.read_index += 4;
    Ok(v)
  }

  pub fn read_u64(&mut self) -> Result<u64> {
    self.ensure_readable(8)?;
    let mut chunk = &self.data[self.read_index..self.read_index + 8];
    let v = chunk.get_u64();
    self.read_index += 8;
    Ok(v)
  }

  pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
    self.ensure_readable(n)?;
    let v = self.data[self.read_index..self.read_index + n].to_vec();
    self.read_index += n;
    Ok(v)
  }

  pub fn read_varint(&mut self) -> Result<u32> {
    let mut result: u32 = 0;
    for shift in (0..35).step_by(7) {
      let byte = self.read_u8()?;
      if shift >= 35 {
        return Err(BufferError::VarintTooLarge);
      }
      result |= ((byte & 0x7F) as u32).checked_shl(shift).unwrap_or(0);
      if byte & 0x80 == 0 {
        return Ok(result);
      }
    }
    Err(BufferError::VarintTooLarge)
  }

  pub fn read_varlong(&mut self) -> Result<u64> {
    let mut result: u64 = 0;
    for shift in (0..70).step_by(7) {
      let byte = self.read_u8()?;
      if shift >= 70 {
        return Err(BufferError::VarintTooLarge);
      }
      result |= ((byte & 0x7F) as u64).checked_shl(shift).unwrap_or(0);
      if byte & 0x80 == 0 {
        return Ok(result);
      }
    }
    Err(BufferError::VarintTooLarge)
  }

  pub fn read_string(&mut self) -> Result<String> {
    let len = self.read_varint()? as usize;
    let bytes = self.read_bytes(len)?;
    String::from_utf8(bytes).map_err(|_| BufferError::InvalidUtf8)
  }

  pub fn read_uuid(&mut self) -> Result<Uuid> {
    let hi = self.read_u64()?;
    let lo = self.read_u64()?;
    let mut bytes = [0u8; 16];
    bytes[0..8].copy_from_slice(&hi.to_be_bytes());
    bytes[8..16].copy_from_slice(&lo.to_be_bytes());
    Ok(Uuid::from_bytes(bytes))
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.data
  }

  pub fn into_vec(self) -> Vec<u8> {
    self.data.to_vec()
  }
}

impl Default for ByteBuffer {
  fn default() -> Self {
    Self::new()
  }
}
