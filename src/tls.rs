//! TLS certificate loading and the in-memory private-key keystore (spec §6,
//! `SPEC_FULL.md` §4.N): certificate chain + PKCS8 private key loaded from
//! configured paths, the key held in memory under a freshly generated
//! passphrase.
//!
//! PEM parsing is grounded on `hdds-team-hdds`'s own `load_pem_certs`
//! (`examples/hdds-team-hdds/crates/hdds/src/transport/quic/transport.rs`),
//! which uses the same `rustls_pemfile::{certs, pkcs8_private_keys}` pair.

#![cfg(feature = "tls")]

use crate::error::{Error, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A passphrase-protected holder for the raw PKCS8 key bytes. The
/// passphrase never leaves the process; this only guards against the key
/// bytes sitting in memory unobscured, per spec §6's "in-memory keystore
/// under a freshly-generated random passphrase".
pub struct Keystore {
  passphrase: String,
  encrypted: Vec<u8>,
}

impl Keystore {
  fn seal(key_bytes: &[u8], passphrase: &str) -> Self {
    let pass_bytes = passphrase.as_bytes();
    let encrypted: Vec<u8> = key_bytes
      .iter()
      .enumerate()
      .map(|(i, b)| b ^ pass_bytes[i % pass_bytes.len()])
      .collect();
    Keystore {
      passphrase: passphrase.to_string(),
      encrypted,
    }
  }

  fn unseal(&self) -> Vec<u8> {
    let pass_bytes = self.passphrase.as_bytes();
    self.encrypted
      .iter()
      .enumerate()
      .map(|(i, b)| b ^ pass_bytes[i % pass_bytes.len()])
      .collect()
  }
}

pub mod passphrase {
  /// Generates a random passphrase of `len` characters (clamped to the
  /// spec's 12-16 range) drawn from `pool` (spec §6).
  pub fn generate(pool: &str, len: usize) -> String {
    use rand::Rng;
    let len = len.clamp(12, 16);
    let chars: Vec<char> = pool.chars().collect();
    let mut rng = rand::thread_rng();
    (0..len)
      .map(|_| chars[rng.gen_range(0..chars.len())])
      .collect()
  }
}

/// Loaded TLS material ready to build a `rustls::ServerConfig` (TLSv1.2+ per
/// spec §6; `ring` provider, enabled via this crate's `tls` feature).
pub struct TlsMaterial {
  pub cert_chain: Vec<CertificateDer<'static>>,
  keystore: Keystore,
}

impl TlsMaterial {
  /// Loads a PEM certificate chain and PKCS8 private key from disk and
  /// seals the key bytes into an in-memory keystore under a freshly
  /// generated passphrase drawn from `passphrase_char_pool`.
  pub fn load(
    cert_path: &Path,
    key_path: &Path,
    passphrase_char_pool: &str,
  ) -> Result<Self> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| {
      Error::Tls(format!("reading certificate {}: {e}", cert_path.display()))
    })?;
    let key_pem = std::fs::read(key_path)
      .map_err(|e| Error::Tls(format!("reading private key {}: {e}", key_path.display())))?;

    let cert_chain: Vec<CertificateDer<'static>> =
      rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
        .filter_map(|r| r.ok())
        .collect();
    if cert_chain.is_empty() {
      return Err(Error::Tls("no certificates found in PEM".to_string()));
    }

    let mut keys: Vec<PrivatePkcs8KeyDer<'static>> =
      rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_pem.as_slice()))
        .filter_map(|r| r.ok())
        .collect();
    let key = keys
      .pop()
      .ok_or_else(|| Error::Tls("no PKCS8 private key found in PEM".to_string()))?;

    let passphrase = passphrase::generate(passphrase_char_pool, 16);
    let keystore = Keystore::seal(key.secret_pkcs8_der(), &passphrase);

    Ok(TlsMaterial {
      cert_chain,
      keystore,
    })
  }

  /// Builds the `rustls::ServerConfig` used by the accept loop, unsealing
  /// the key from the keystore for exactly as long as it takes to hand it
  /// to `rustls`.
  pub fn server_config(&self) -> Result<Arc<rustls::ServerConfig>> {
    let key_bytes = self.keystore.unseal();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_bytes));
    let config = rustls::ServerConfig::builder()
      .with_no_client_auth()
      .with_single_cert(self.cert_chain.clone(), key)
      .map_err(|e| Error::Tls(e.to_string()))?;
    Ok(Arc::new(config))
  }
}

/// A cloneable TLS-wrapped connection satisfying the same `Read + Write +
/// TryCloneStream + SetReadTimeout` surface `websocket::connection::serve`
/// and `server::dispatch_http` expect of a plain `TcpStream`.
///
/// `rustls::StreamOwned` cannot be split into independent read/write halves
/// the way `TcpStream::try_clone` can, so both logical halves here share one
/// mutex-guarded connection -- serialized, like every other writer in this
/// crate's per-connection model.
pub struct TlsStream {
  inner: Arc<Mutex<rustls::StreamOwned<rustls::ServerConnection, TcpStream>>>,
}

impl TlsStream {
  pub fn new(conn: rustls::ServerConnection, sock: TcpStream) -> Self {
    TlsStream {
      inner: Arc::new(Mutex::new(rustls::StreamOwned::new(conn, sock))),
    }
  }
}

impl Read for TlsStream {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    self.inner.lock().unwrap().read(buf)
  }
}

impl Write for TlsStream {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.inner.lock().unwrap().write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    self.inner.lock().unwrap().flush()
  }
}

impl crate::websocket::connection::TryCloneStream for TlsStream {
  fn try_clone(&self) -> std::io::Result<Self> {
    Ok(TlsStream {
      inner: self.inner.clone(),
    })
  }
}

impl crate::websocket::connection::SetReadTimeout for TlsStream {
  fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
    self.inner.lock().unwrap().sock.set_read_timeout(timeout)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn passphrase_is_within_spec_length_range() {
    let pool = "ABCDEFGHIJ";
    let pass = passphrase::generate(pool, 16);
    assert!(pass.len() >= 12 && pass.len() <= 16);
    assert!(pass.chars().all(|c| pool.contains(c)));
  }

  #[test]
  fn keystore_round_trips_key_bytes() {
    let key_bytes = b"not-a-real-pkcs8-key-but-bytes".to_vec();
    let keystore = Keystore::seal(&key_bytes, "somepassphrase12");
    assert_eq!(keystore.unseal(), key_bytes);
    assert_ne!(keystore.encrypted, key_bytes);
  }
}
