//! Route registry (spec §4.B): holds endpoint/share/websocket mappings and
//! answers match queries. Registration/unregistration swap an immutable
//! snapshot (`Arc<Snapshot>`) guarded by a single mutex; a `resolve()` call
//! clones the `Arc` once and reads its own consistent view for the rest of
//! the call, matching spec §5's "copy-on-write... readers hold the snapshot
//! for the duration of a single resolve call".

use crate::error::{Error, Result};
use crate::method::Method;
use crate::pattern::CompiledPattern;
use crate::priority::{Priority, ALL_PRIORITIES_ASCENDING};
use crate::requirement::{HttpRequirement, HttpRequirementContext, WsRequirement, WsRequirementContext};
use crate::request::Request;
use crate::transformer::TransformerDescriptor;
use std::any::Any;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Opaque handle returned by `register`, used later to `unregister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
  Http,
  WebSocket,
}

pub type ArgValues = Vec<Arc<dyn Any + Send + Sync>>;

pub trait HttpHandler: Send + Sync {
  fn call(&self, exchange: &mut crate::exchange::Exchange, args: &ArgValues) -> Result<()>;
}

impl<F> HttpHandler for F
where
  F: Fn(&mut crate::exchange::Exchange, &ArgValues) -> Result<()> + Send + Sync,
{
  fn call(&self, exchange: &mut crate::exchange::Exchange, args: &ArgValues) -> Result<()> {
    self(exchange, args)
  }
}

pub trait WsHandler: Send + Sync {
  fn call(
    &self,
    exchange: &mut crate::websocket::connection::WsExchange,
    payload: &[u8],
    args: &ArgValues,
  ) -> Result<()>;
}

impl<F> WsHandler for F
where
  F: Fn(&mut crate::websocket::connection::WsExchange, &[u8], &ArgValues) -> Result<()>
    + Send
    + Sync,
{
  fn call(
    &self,
    exchange: &mut crate::websocket::connection::WsExchange,
    payload: &[u8],
    args: &ArgValues,
  ) -> Result<()> {
    self(exchange, payload, args)
  }
}

/// Immutable endpoint record (spec §3). Created at registration, never
/// mutated, destroyed when unregistered.
pub struct HttpEndpointMapping {
  pub handle: RouteHandle,
  pub pattern: CompiledPattern,
  pub methods: HashSet<Method>,
  pub domains: HashSet<String>,
  pub required_headers: HashSet<String>,
  pub handler: Arc<dyn HttpHandler>,
  pub priority: Priority,
  pub requirements: Vec<Arc<dyn HttpRequirement>>,
  pub transformers: Vec<TransformerDescriptor>,
  pub registration_seq: u64,
}

pub struct WsEndpointMapping {
  pub handle: RouteHandle,
  pub pattern: CompiledPattern,
  pub domains: HashSet<String>,
  pub required_headers: HashSet<String>,
  pub handler: Arc<dyn WsHandler>,
  pub priority: Priority,
  pub requirements: Vec<Arc<dyn WsRequirement>>,
  pub transformers: Vec<TransformerDescriptor>,
  pub registration_seq: u64,
}

pub struct ShareMapping {
  pub handle: RouteHandle,
  pub prefix: String,
  pub root: PathBuf,
  pub index_file: String,
}

#[derive(Default)]
struct Snapshot {
  http: Vec<Arc<HttpEndpointMapping>>,
  ws: Vec<Arc<WsEndpointMapping>>,
  shares: Vec<Arc<ShareMapping>>,
}

pub struct RouteRegistry {
  snapshot: Mutex<Arc<Snapshot>>,
  seq: AtomicU64,
  next_handle: AtomicU64,
}

/// Builder-style registration parameters for an HTTP endpoint.
pub struct HttpRegistration {
  pub pattern: String,
  pub methods: HashSet<Method>,
  pub domains: HashSet<String>,
  pub required_headers: HashSet<String>,
  pub priority: Priority,
  pub requirements: Vec<Arc<dyn HttpRequirement>>,
  pub transformers: Vec<TransformerDescriptor>,
}

pub struct WsRegistration {
  pub pattern: String,
  pub domains: HashSet<String>,
  pub required_headers: HashSet<String>,
  pub priority: Priority,
  pub requirements: Vec<Arc<dyn WsRequirement>>,
  pub transformers: Vec<TransformerDescriptor>,
}

impl RouteRegistry {
  pub fn new() -> Arc<Self> {
    Arc::new(RouteRegistry {
      snapshot: Mutex::new(Arc::new(Snapshot::default())),
      seq: AtomicU64::new(0),
      next_handle: AtomicU64::new(1),
    })
  }

  fn alloc_handle(&self) -> RouteHandle {
    RouteHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
  }

  fn next_seq(&self) -> u64 {
    self.seq.fetch_add(1, Ordering::Relaxed)
  }

  pub fn register_http(
    &self,
    reg: HttpRegistration,
    handler: impl HttpHandler + 'static,
  ) -> Result<RouteHandle> {
    let pattern = CompiledPattern::compile(&reg.pattern)?;
    let handler: Arc<dyn HttpHandler> = Arc::new(handler);
    let mut guard = self.snapshot.lock().unwrap();

    for existing in &guard.http {
      if existing.pattern.template() == pattern.template()
        && existing.methods == reg.methods
        && existing.domains == reg.domains
      {
        return Err(Error::DuplicateRoute);
      }
    }

    let handle = self.alloc_handle();
    let mapping = Arc::new(HttpEndpointMapping {
      handle,
      pattern,
      methods: reg.methods,
      domains: reg.domains,
      required_headers: reg.required_headers,
      handler,
      priority: reg.priority,
      requirements: reg.requirements,
      transformers: reg.transformers,
      registration_seq: self.next_seq(),
    });

    let mut next = (**guard).clone_shallow();
    next.http.push(mapping);
    *guard = Arc::new(next);
    Ok(handle)
  }

  pub fn register_ws(
    &self,
    reg: WsRegistration,
    handler: impl WsHandler + 'static,
  ) -> Result<RouteHandle> {
    let pattern = CompiledPattern::compile(&reg.pattern)?;
    let handler: Arc<dyn WsHandler> = Arc::new(handler);
    let mut guard = self.snapshot.lock().unwrap();

    for existing in &guard.ws {
      if existing.pattern.template() == pattern.template() && existing.domains == reg.domains {
        return Err(Error::DuplicateRoute);
      }
    }

    let handle = self.alloc_handle();
    let mapping = Arc::new(WsEndpointMapping {
      handle,
      pattern,
      domains: reg.domains,
      required_headers: reg.required_headers,
      handler,
      priority: reg.priority,
      requirements: reg.requirements,
      transformers: reg.transformers,
      registration_seq: self.next_seq(),
    });

    let mut next = (**guard).clone_shallow();
    next.ws.push(mapping);
    *guard = Arc::new(next);
    Ok(handle)
  }

  pub fn register_share(
    &self,
    prefix: impl Into<String>,
    root: PathBuf,
    index_file: impl Into<String>,
  ) -> Result<RouteHandle> {
    let root = root
      .canonicalize()
      .map_err(|e| Error::Forbidden(format!("share root does not exist: {e}")))?;
    let handle = self.alloc_handle();
    let mapping = Arc::new(ShareMapping {
      handle,
      prefix: prefix.into(),
      root,
      index_file: index_file.into(),
    });
    let mut guard = self.snapshot.lock().unwrap();
    let mut next = (**guard).clone_shallow();
    next.shares.push(mapping);
    *guard = Arc::new(next);
    Ok(handle)
  }

  pub fn unregister(&self, handle: RouteHandle) {
    let mut guard = self.snapshot.lock().unwrap();
    let mut next = (**guard).clone_shallow();
    next.http.retain(|m| m.handle != handle);
    next.ws.retain(|m| m.handle != handle);
    next.shares.retain(|m| m.handle != handle);
    *guard = Arc::new(next);
  }

  /// Resolves HTTP endpoints matching `(path, method, domain, headers)`,
  /// sorted by (priority ascending, registration index ascending) per
  /// spec §4.B / §8 property 1.
  pub fn resolve_http(
    &self,
    request: &Request,
  ) -> Vec<(Arc<HttpEndpointMapping>, Vec<String>)> {
    let snapshot = self.snapshot.lock().unwrap().clone();
    let header_names = request.headers.names();

    let mut matches: Vec<(Arc<HttpEndpointMapping>, Vec<String>)> = snapshot
      .http
      .iter()
      .filter_map(|mapping| {
        let captures = mapping.pattern.matches(&request.path)?;
        if !mapping.methods.contains(&request.method) {
          return None;
        }
        if !mapping.domains.is_empty() {
          let domain = request
            .headers
            .get("host")
            .map(|h| h.split(':').next().unwrap_or(h))
            .unwrap_or("");
          if !mapping.domains.contains(domain) {
            return None;
          }
        }
        if !mapping.required_headers.is_subset(&header_names) {
          return None;
        }
        let ctx = HttpRequirementContext { request };
        if mapping.requirements.iter().any(|r| !r.applies(&ctx)) {
          return None;
        }
        Some((mapping.clone(), captures))
      })
      .collect();

    sort_by_priority_then_registration(&mut matches, |(m, _)| (m.priority, m.registration_seq));
    matches
  }

  pub fn resolve_ws(
    &self,
    path: &str,
    domain: &str,
    headers: &crate::request::HeaderMap,
    opcode: Option<crate::websocket::frame::OpCode>,
  ) -> Vec<(Arc<WsEndpointMapping>, Vec<String>)> {
    let snapshot = self.snapshot.lock().unwrap().clone();
    let header_names = headers.names();

    let mut matches: Vec<(Arc<WsEndpointMapping>, Vec<String>)> = snapshot
      .ws
      .iter()
      .filter_map(|mapping| {
        let captures = mapping.pattern.matches(path)?;
        if !mapping.domains.is_empty() && !mapping.domains.contains(domain) {
          return None;
        }
        if !mapping.required_headers.is_subset(&header_names) {
          return None;
        }
        let ctx = WsRequirementContext {
          path,
          headers,
          opcode,
        };
        if mapping.requirements.iter().any(|r| !r.applies(&ctx)) {
          return None;
        }
        Some((mapping.clone(), captures))
      })
      .collect();

    sort_by_priority_then_registration(&mut matches, |(m, _)| (m.priority, m.registration_seq));
    matches
  }

  pub fn is_share(&self, path: &str) -> bool {
    self.get_share(path).is_some()
  }

  pub fn get_share(&self, path: &str) -> Option<Arc<ShareMapping>> {
    let snapshot = self.snapshot.lock().unwrap().clone();
    snapshot
      .shares
      .iter()
      .find(|s| path == s.prefix.trim_matches('/') || path.starts_with(&format!("{}/", s.prefix.trim_matches('/'))))
      .cloned()
  }
}

fn sort_by_priority_then_registration<T>(
  items: &mut [T],
  key: impl Fn(&T) -> (Priority, u64),
) {
  items.sort_by(|a, b| {
    let (pa, sa) = key(a);
    let (pb, sb) = key(b);
    pa.cmp(&pb).then(sa.cmp(&sb))
  });
  debug_assert!(ALL_PRIORITIES_ASCENDING[0] <= ALL_PRIORITIES_ASCENDING[5]);
}

impl Snapshot {
  fn clone_shallow(&self) -> Snapshot {
    Snapshot {
      http: self.http.clone(),
      ws: self.ws.clone(),
      shares: self.shares.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exchange::Exchange;

  fn noop_handler(_ex: &mut Exchange, _args: &ArgValues) -> Result<()> {
    Ok(())
  }

  fn sample_request(path: &str, method: Method) -> Request {
    Request::new(
      format!("/{path}"),
      crate::request::HeaderMap::new(),
      "127.0.0.1".to_string(),
      method,
      crate::body::BodyHandle::empty(),
    )
  }

  #[test]
  fn resolve_is_deterministic_across_calls() {
    let registry = RouteRegistry::new();
    let mut methods = HashSet::new();
    methods.insert(Method::Get);
    registry
      .register_http(
        HttpRegistration {
          pattern: "/users/{id:int}".to_string(),
          methods,
          domains: HashSet::new(),
          required_headers: HashSet::new(),
          priority: Priority::Normal,
          requirements: Vec::new(),
          transformers: Vec::new(),
        },
        noop_handler,
      )
      .unwrap();

    let req = sample_request("users/42", Method::Get);
    let first = registry.resolve_http(&req);
    let second = registry.resolve_http(&req);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].1, vec!["42".to_string()]);
    assert_eq!(second[0].1, vec!["42".to_string()]);
  }

  #[test]
  fn resolve_orders_by_priority_then_registration() {
    let registry = RouteRegistry::new();
    let mut methods = HashSet::new();
    methods.insert(Method::Get);

    for priority in [Priority::High, Priority::Normal] {
      registry
        .register_http(
          HttpRegistration {
            pattern: "/ping".to_string(),
            methods: methods.clone(),
            domains: HashSet::new(),
            required_headers: HashSet::new(),
            priority,
            requirements: Vec::new(),
            transformers: Vec::new(),
          },
          noop_handler,
        )
        .unwrap();
    }

    let req = sample_request("ping", Method::Get);
    let matches = registry.resolve_http(&req);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].0.priority, Priority::Normal);
    assert_eq!(matches[1].0.priority, Priority::High);
  }

  #[test]
  fn register_rejects_exact_duplicate() {
    let registry = RouteRegistry::new();
    let mut methods = HashSet::new();
    methods.insert(Method::Get);
    let reg = || HttpRegistration {
      pattern: "/dup".to_string(),
      methods: methods.clone(),
      domains: HashSet::new(),
      required_headers: HashSet::new(),
      priority: Priority::Normal,
      requirements: Vec::new(),
      transformers: Vec::new(),
    };
    registry.register_http(reg(), noop_handler).unwrap();
    let err = registry.register_http(reg(), noop_handler).unwrap_err();
    assert!(matches!(err, Error::DuplicateRoute));
  }

  #[test]
  fn unregister_removes_mapping() {
    let registry = RouteRegistry::new();
    let mut methods = HashSet::new();
    methods.insert(Method::Get);
    let handle = registry
      .register_http(
        HttpRegistration {
          pattern: "/gone".to_string(),
          methods,
          domains: HashSet::new(),
          required_headers: HashSet::new(),
          priority: Priority::Normal,
          requirements: Vec::new(),
          transformers: Vec::new(),
        },
        noop_handler,
      )
      .unwrap();

    registry.unregister(handle);
    let req = sample_request("gone", Method::Get);
    assert!(registry.resolve_http(&req).is_empty());
  }

  #[test]
  fn resolve_never_panics_on_empty_registry() {
    let registry = RouteRegistry::new();
    let req = sample_request("anything", Method::Get);
    assert!(registry.resolve_http(&req).is_empty());
  }
}
