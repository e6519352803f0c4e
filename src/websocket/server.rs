//! WebSocket connection registry (spec §4.J): the `path -> set<client>` map,
//! broadcast, and graceful shutdown. The TCP accept loop itself lives in
//! the top-level `server.rs`, which owns both the HTTP and WebSocket sides
//! of one listener and routes each accepted connection to `connection::serve`
//! or the HTTP dispatcher based on the `Upgrade` header.

use super::connection::ClientHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct ClientManager {
  clients: Mutex<HashMap<String, Vec<ClientHandle>>>,
}

impl ClientManager {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn register(&self, handle: ClientHandle) {
    self.clients
      .lock()
      .unwrap()
      .entry(handle.path.clone())
      .or_default()
      .push(handle);
  }

  pub fn unregister(&self, handle: &ClientHandle) {
    let mut clients = self.clients.lock().unwrap();
    if let Some(bucket) = clients.get_mut(&handle.path) {
      bucket.retain(|existing| !existing.same_connection(handle));
      if bucket.is_empty() {
        clients.remove(&handle.path);
      }
    }
  }

  pub fn client_count(&self, path: &str) -> usize {
    self.clients.lock().unwrap().get(path).map(Vec::len).unwrap_or(0)
  }

  /// Fans out a text payload to every client connected under `path` (spec
  /// §4.J: "Broadcast fans out a text/binary payload to all clients under
  /// a path"). Failures to individual clients are swallowed; their next
  /// read will observe the severed connection and clean up.
  pub fn broadcast_text(&self, path: &str, text: &str) {
    if let Some(bucket) = self.clients.lock().unwrap().get(path) {
      for client in bucket {
        let _ = client.send_text(text);
      }
    }
  }

  pub fn broadcast_binary(&self, path: &str, data: &[u8]) {
    if let Some(bucket) = self.clients.lock().unwrap().get(path) {
      for client in bucket {
        let _ = client.send_binary(data);
      }
    }
  }

  /// Sends 1001 Going Away to every connected client (spec §4.J: "Graceful
  /// shutdown sends 1001 to all clients").
  pub fn shutdown_all(&self) {
    let mut clients = self.clients.lock().unwrap();
    for (_, bucket) in clients.drain() {
      for client in bucket {
        let _ = client.close(1001, b"server shutting down");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn sink() -> Arc<Mutex<dyn Write + Send>> {
    Arc::new(Mutex::new(Vec::<u8>::new()))
  }

  #[test]
  fn empty_manager_has_no_clients() {
    let manager = ClientManager::new();
    assert_eq!(manager.client_count("chat"), 0);
  }

  #[test]
  fn register_then_unregister_removes_the_client() {
    let manager = ClientManager::new();
    let handle = ClientHandle::for_test("chat", sink());
    manager.register(handle.clone());
    assert_eq!(manager.client_count("chat"), 1);
    manager.unregister(&handle);
    assert_eq!(manager.client_count("chat"), 0);
  }

  #[test]
  fn broadcast_reaches_every_client_under_a_path() {
    let manager = ClientManager::new();
    let a = sink();
    let b = sink();
    manager.register(ClientHandle::for_test("chat", a.clone()));
    manager.register(ClientHandle::for_test("chat", b.clone()));
    manager.broadcast_text("chat", "hello");
    assert!(!a.lock().unwrap().is_empty());
    assert!(!b.lock().unwrap().is_empty());
  }

  #[test]
  fn shutdown_all_clears_every_path() {
    let manager = ClientManager::new();
    manager.register(ClientHandle::for_test("chat", sink()));
    manager.register(ClientHandle::for_test("lobby", sink()));
    manager.shutdown_all();
    assert_eq!(manager.client_count("chat"), 0);
    assert_eq!(manager.client_count("lobby"), 0);
  }
}
