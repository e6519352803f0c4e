//! Static file share handler (spec §4.K): resolves a share prefix to a file
//! under its root, preventing path traversal via canonicalization, and
//! streams it through the response writer.
//!
//! MIME detection goes through [`MimeOracle`] rather than calling
//! `mime_guess` inline, so an embedding application can substitute its own
//! table (a custom extension map, `libmagic`-style sniffing, ...) without
//! forking this module.

use crate::events::ShareFileLoadedEvent;
use crate::exchange::Exchange;
use crate::registry::ShareMapping;
use std::path::Path;

const SERVER_IDENTIFIER: &str = "embercore";

/// Resolves a file path to a `content-type` value. Implementations may
/// inspect only the extension, or open the file and sniff its contents; the
/// share handler doesn't care which.
pub trait MimeOracle: Send + Sync {
  fn guess(&self, path: &Path) -> String;
}

/// The oracle `serve` falls back to: extension-based lookup via `mime_guess`,
/// the same crate the teacher already pulled in for this purpose.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMimeOracle;

impl MimeOracle for DefaultMimeOracle {
  fn guess(&self, path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
  }
}

fn error_page(title: &str, message: &str) -> String {
  format!(
    "<!DOCTYPE html><html><head><title>{title}</title></head><body>\
     <h1>{title}</h1><p>{message}</p>\
     <hr><p>{SERVER_IDENTIFIER} on {}</p></body></html>",
    std::env::consts::OS
  )
}

fn forbidden_page() -> String {
  error_page("403 Forbidden", "You do not have permission to access this resource.")
}

fn not_found_page() -> String {
  error_page("404 Not Found", "The requested resource could not be found.")
}

/// Serves `sub_path` (already stripped of the share prefix) out of
/// `mapping.root`. GET-only; callers (the dispatcher) are responsible for
/// routing only GET requests here.
pub fn serve(
  mapping: &ShareMapping,
  sub_path: &str,
  events: &crate::events::EventBus,
  oracle: &dyn MimeOracle,
  exchange: &mut Exchange,
) -> crate::error::Result<()> {
  let sub_path = if sub_path.is_empty() {
    mapping.index_file.clone()
  } else {
    sub_path.to_string()
  };

  let candidate = mapping.root.join(&sub_path);
  let canonical = match candidate.canonicalize() {
    Ok(path) => path,
    Err(_) => {
      exchange.response.set_status(404)?;
      exchange.response.set_header("content-type", "text/html")?;
      exchange.response.print_bytes(not_found_page().as_bytes())?;
      return Ok(());
    }
  };

  // `Path::starts_with` compares components, not bytes, so this alone
  // rejects `../` escapes without a separate prefix-string guard.
  if !canonical.starts_with(&mapping.root) {
    exchange.response.set_status(403)?;
    exchange.response.set_header("content-type", "text/html")?;
    exchange.response.print_bytes(forbidden_page().as_bytes())?;
    return Ok(());
  }

  if !canonical.is_file() {
    exchange.response.set_status(404)?;
    exchange.response.set_header("content-type", "text/html")?;
    exchange.response.print_bytes(not_found_page().as_bytes())?;
    return Ok(());
  }

  let content_type = oracle.guess(&canonical);

  let loaded = events.share_file_loaded.fire(ShareFileLoadedEvent {
    path: canonical.clone(),
    content_type,
    bytes: None,
  });

  exchange.response.set_header("content-type", loaded.content_type)?;
  match loaded.bytes {
    Some(bytes) => exchange.response.print_bytes(&bytes)?,
    None => exchange.response.print_file(&canonical)?,
  }
  Ok(())
}
