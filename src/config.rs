//! Server configuration (spec §4.M, ambient). Builder style, mirroring the
//! teacher's `set_*` setters on `WebSocket` (`examples/willrnch-fastwebsockets`),
//! generalized to the handful of knobs spec §5/§6 call out by name.

use crate::websocket::extension::DeflateConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pool_size: usize,
  ws_read_timeout: Duration,
  temp_dir_override: Option<PathBuf>,
  temp_dir_min_free_bytes: u64,
  deflate: DeflateConfig,
  default_encoder: crate::encoding::Encoding,
  default_index_file: String,
  tls_cert_path: Option<PathBuf>,
  tls_key_path: Option<PathBuf>,
  passphrase_char_pool: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    ServerConfig {
      pool_size: 25,
      ws_read_timeout: Duration::from_secs(5 * 60),
      temp_dir_override: None,
      temp_dir_min_free_bytes: 250 * 1024 * 1024,
      deflate: DeflateConfig::default(),
      default_encoder: crate::encoding::Encoding::Identity,
      default_index_file: "index.html".to_string(),
      tls_cert_path: None,
      tls_key_path: None,
      passphrase_char_pool:
        "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789".to_string(),
    }
  }
}

impl ServerConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn pool_size(mut self, size: usize) -> Self {
    self.pool_size = size;
    self
  }

  pub fn ws_read_timeout(mut self, timeout: Duration) -> Self {
    self.ws_read_timeout = timeout;
    self
  }

  pub fn temp_dir(mut self, dir: PathBuf) -> Self {
    self.temp_dir_override = Some(dir);
    self
  }

  pub fn temp_dir_min_free_bytes(mut self, bytes: u64) -> Self {
    self.temp_dir_min_free_bytes = bytes;
    self
  }

  pub fn deflate_config(mut self, deflate: DeflateConfig) -> Self {
    self.deflate = deflate;
    self
  }

  pub fn default_encoder(mut self, encoder: crate::encoding::Encoding) -> Self {
    self.default_encoder = encoder;
    self
  }

  pub fn default_index_file(mut self, name: impl Into<String>) -> Self {
    self.default_index_file = name.into();
    self
  }

  pub fn tls_paths(mut self, cert: PathBuf, key: PathBuf) -> Self {
    self.tls_cert_path = Some(cert);
    self.tls_key_path = Some(key);
    self
  }

  pub fn passphrase_char_pool(mut self, pool: impl Into<String>) -> Self {
    self.passphrase_char_pool = pool.into();
    self
  }

  pub fn get_pool_size(&self) -> usize {
    self.pool_size
  }

  pub fn get_ws_read_timeout(&self) -> Duration {
    self.ws_read_timeout
  }

  pub fn resolve_temp_dir(&self) -> PathBuf {
    crate::body::resolve_temp_dir(self.temp_dir_override.as_deref(), self.temp_dir_min_free_bytes)
  }

  pub fn deflate(&self) -> &DeflateConfig {
    &self.deflate
  }

  pub fn get_default_encoder(&self) -> crate::encoding::Encoding {
    self.default_encoder
  }

  pub fn get_default_index_file(&self) -> &str {
    &self.default_index_file
  }

  pub fn tls_cert_path(&self) -> Option<&std::path::Path> {
    self.tls_cert_path.as_deref()
  }

  pub fn tls_key_path(&self) -> Option<&std::path::Path> {
    self.tls_key_path.as_deref()
  }

  pub fn get_passphrase_char_pool(&self) -> &str {
    &self.passphrase_char_pool
  }
}
