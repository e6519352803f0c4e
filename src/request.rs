//! The HTTP `Request` (spec §3) plus the `HeaderMap` multimap it, the
//! response, and the WebSocket handshake all share.

use crate::body::BodyHandle;
use crate::cookie::Cookie;
use crate::method::Method;
use std::any::Any;
use std::collections::HashMap;

/// A case-insensitive header multimap that preserves insertion order per
/// name. Looked up by lowercase key internally.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
  entries: Vec<(String, String)>,
}

impl HeaderMap {
  pub fn new() -> Self {
    HeaderMap::default()
  }

  pub fn insert(&mut self, name: &str, value: impl Into<String>) {
    self.entries.push((name.to_ascii_lowercase(), value.into()));
  }

  /// First value for `name`, case-insensitive.
  pub fn get(&self, name: &str) -> Option<&str> {
    let key = name.to_ascii_lowercase();
    self.entries
      .iter()
      .find(|(k, _)| *k == key)
      .map(|(_, v)| v.as_str())
  }

  /// All values for `name`, in insertion order.
  pub fn get_all(&self, name: &str) -> Vec<&str> {
    let key = name.to_ascii_lowercase();
    self.entries
      .iter()
      .filter(|(k, _)| *k == key)
      .map(|(_, v)| v.as_str())
      .collect()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.get(name).is_some()
  }

  /// Lowercased names present, used by the registry's `required-headers`
  /// subset check (spec §4.B).
  pub fn names(&self) -> std::collections::HashSet<String> {
    self.entries.iter().map(|(k, _)| k.clone()).collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

/// Ordered-insertion query parameter map (spec §3: "ordered-insertion query
/// parameter map"). Percent-decoded via `urlencoding`.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
  entries: Vec<(String, String)>,
}

impl QueryParams {
  pub fn parse(raw_query: &str) -> Self {
    let mut entries = Vec::new();
    for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
      let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
      let key = urlencoding::decode(k).map(|c| c.into_owned()).unwrap_or_else(|_| k.to_string());
      let val = urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string());
      entries.push((key, val));
    }
    QueryParams { entries }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  pub fn get_all(&self, key: &str) -> Vec<&str> {
    self.entries.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str()).collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Per-request key/value scratch storage (spec §3 component M). Values are
/// type-erased; retrieval is by the caller's expected type.
#[derive(Default)]
pub struct Scratch {
  values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Scratch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
    self.values.insert(key.into(), Box::new(value));
  }

  pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
    self.values.get(key).and_then(|v| v.downcast_ref::<T>())
  }

  pub fn remove(&mut self, key: &str) {
    self.values.remove(key);
  }
}

/// Where the dispatcher resolved the client's address from (spec §3: "remote
/// IP: resolved through `Cf-Connecting-IP`, first token of
/// `X-Forwarded-For`, or TCP peer, in that order").
pub fn resolve_remote_ip(headers: &HeaderMap, peer_ip: &str) -> String {
  if let Some(cf) = headers.get("cf-connecting-ip") {
    return cf.to_string();
  }
  if let Some(xff) = headers.get("x-forwarded-for") {
    if let Some(first) = xff.split(',').next() {
      return first.trim().to_string();
    }
  }
  peer_ip.to_string()
}

pub struct Request {
  pub raw_url: String,
  pub path: String,
  pub query: QueryParams,
  pub cookies: Vec<Cookie>,
  pub headers: HeaderMap,
  pub remote_ip: String,
  pub method: Method,
  pub body: BodyHandle,
  pub matched_endpoints: Vec<crate::registry::RouteHandle>,
  pub scratch: Scratch,
}

impl Request {
  /// Splits a raw request-line target into `(trimmed path, query string)`
  /// and builds the cookie table from the `Cookie` header.
  pub fn new(
    raw_url: String,
    headers: HeaderMap,
    peer_ip: String,
    method: Method,
    body: BodyHandle,
  ) -> Self {
    let (path_part, query_part) = match raw_url.split_once('?') {
      Some((p, q)) => (p, q),
      None => (raw_url.as_str(), ""),
    };
    let trimmed_path = path_part.trim_matches('/').to_string();
    let query = QueryParams::parse(query_part);
    let cookies = headers
      .get("cookie")
      .map(Cookie::parse_request_header)
      .unwrap_or_default();
    let remote_ip = resolve_remote_ip(&headers, &peer_ip);

    Request {
      raw_url,
      path: trimmed_path,
      query,
      cookies,
      headers,
      remote_ip,
      method,
      body,
      matched_endpoints: Vec::new(),
      scratch: Scratch::new(),
    }
  }

  pub fn wants_pretty_json(&self) -> bool {
    self.query.get("format") == Some("pretty")
  }

  pub fn cookie(&self, name: &str) -> Option<&Cookie> {
    self.cookies.iter().find(|c| c.name == name)
  }

  #[cfg(test)]
  pub fn for_test(headers: HeaderMap) -> Self {
    Request::new(
      "/".to_string(),
      headers,
      "127.0.0.1".to_string(),
      Method::Get,
      BodyHandle::empty(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_map_is_case_insensitive() {
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", "application/json");
    assert_eq!(headers.get("content-type"), Some("application/json"));
    assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
  }

  #[test]
  fn remote_ip_prefers_cf_connecting_ip() {
    let mut headers = HeaderMap::new();
    headers.insert("cf-connecting-ip", "1.1.1.1");
    headers.insert("x-forwarded-for", "2.2.2.2, 3.3.3.3");
    assert_eq!(resolve_remote_ip(&headers, "9.9.9.9"), "1.1.1.1");
  }

  #[test]
  fn remote_ip_falls_back_to_first_xff_token() {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "2.2.2.2, 3.3.3.3");
    assert_eq!(resolve_remote_ip(&headers, "9.9.9.9"), "2.2.2.2");
  }

  #[test]
  fn remote_ip_falls_back_to_peer() {
    let headers = HeaderMap::new();
    assert_eq!(resolve_remote_ip(&headers, "9.9.9.9"), "9.9.9.9");
  }

  #[test]
  fn query_params_preserve_insertion_order_and_decode() {
    let q = QueryParams::parse("format=pretty&name=a%20b");
    let pairs: Vec<_> = q.iter().collect();
    assert_eq!(pairs, vec![("format", "pretty"), ("name", "a b")]);
  }

  #[test]
  fn path_is_trimmed_and_query_split_off() {
    let req = Request::new(
      "/users/42/?format=pretty".to_string(),
      HeaderMap::new(),
      "127.0.0.1".to_string(),
      Method::Get,
      BodyHandle::empty(),
    );
    assert_eq!(req.path, "users/42");
    assert!(req.wants_pretty_json());
  }
}
