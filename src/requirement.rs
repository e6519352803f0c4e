//! Requirement predicates (spec §4.C): per-dispatch admission checks run
//! after pattern matching but before the transformer pipeline. Any `false`
//! result removes that mapping from the candidate list for this dispatch.

use crate::request::Request;
use std::collections::HashSet;

/// Context visible to an HTTP requirement: the inbound request plus the
/// header names present, precomputed so built-ins don't re-scan the map.
pub struct HttpRequirementContext<'a> {
  pub request: &'a Request,
}

/// Context visible to a WebSocket requirement: the connection's negotiated
/// state and, when evaluated against a data frame, that frame's opcode.
pub struct WsRequirementContext<'a> {
  pub path: &'a str,
  pub headers: &'a crate::request::HeaderMap,
  pub opcode: Option<crate::websocket::frame::OpCode>,
}

pub trait HttpRequirement: Send + Sync {
  fn applies(&self, ctx: &HttpRequirementContext<'_>) -> bool;
  fn name(&self) -> &str;
}

pub trait WsRequirement: Send + Sync {
  fn applies(&self, ctx: &WsRequirementContext<'_>) -> bool;
  fn name(&self) -> &str;
}

/// Built-in: request domain (`Host` header, port stripped) must be in an
/// allowlist.
pub struct DomainAllowlist {
  pub allowed: HashSet<String>,
}

impl HttpRequirement for DomainAllowlist {
  fn applies(&self, ctx: &HttpRequirementContext<'_>) -> bool {
    match ctx.request.headers.get("host") {
      Some(host) => {
        let domain = host.split(':').next().unwrap_or(host);
        self.allowed.contains(domain)
      }
      None => false,
    }
  }

  fn name(&self) -> &str {
    "domain-allowlist"
  }
}

/// Built-in: a specific header must be present (value not checked).
pub struct HeaderPresent {
  pub header: String,
}

impl HttpRequirement for HeaderPresent {
  fn applies(&self, ctx: &HttpRequirementContext<'_>) -> bool {
    ctx.request.headers.get(&self.header).is_some()
  }

  fn name(&self) -> &str {
    "header-present"
  }
}

/// Built-in WebSocket requirement: only admit a specific frame opcode
/// (applications compose a custom one for anything richer).
pub struct FramePredicate {
  pub opcode: crate::websocket::frame::OpCode,
}

impl WsRequirement for FramePredicate {
  fn applies(&self, ctx: &WsRequirementContext<'_>) -> bool {
    ctx.opcode == Some(self.opcode)
  }

  fn name(&self) -> &str {
    "frame-opcode"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::request::HeaderMap;

  #[test]
  fn domain_allowlist_checks_host_without_port() {
    let mut allowed = HashSet::new();
    allowed.insert("example.com".to_string());
    let req = DomainAllowlist { allowed };

    let mut headers = HeaderMap::new();
    headers.insert("host", "example.com:8080");
    let request = Request::for_test(headers);
    assert!(req.applies(&HttpRequirementContext { request: &request }));
  }

  #[test]
  fn header_present_requires_header() {
    let req = HeaderPresent {
      header: "x-api-key".to_string(),
    };
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", "secret");
    let request = Request::for_test(headers);
    assert!(req.applies(&HttpRequirementContext { request: &request }));

    let request_missing = Request::for_test(HeaderMap::new());
    assert!(!req.applies(&HttpRequirementContext {
      request: &request_missing
    }));
  }
}
