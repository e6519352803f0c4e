//! Framework context (spec §4.O, ambient): bundles the three pieces of
//! shared state a dispatcher, the WebSocket server, and the share handler
//! all need, replacing any notion of a process-wide singleton.

use crate::config::ServerConfig;
use crate::events::EventBus;
use crate::registry::RouteRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct FrameworkContext {
  pub registry: Arc<RouteRegistry>,
  pub events: Arc<EventBus>,
  pub config: Arc<ServerConfig>,
}

impl FrameworkContext {
  pub fn new(config: ServerConfig) -> Self {
    FrameworkContext {
      registry: RouteRegistry::new(),
      events: EventBus::new(),
      config: Arc::new(config),
    }
  }
}

impl Default for FrameworkContext {
  fn default() -> Self {
    Self::new(ServerConfig::default())
  }
}
