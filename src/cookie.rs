//! HTTP cookies (spec §3, §6).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
  Strict,
  Lax,
  None,
}

impl fmt::Display for SameSite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SameSite::Strict => write!(f, "Strict"),
      SameSite::Lax => write!(f, "Lax"),
      SameSite::None => write!(f, "None"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Cookie {
  pub name: String,
  pub value: String,
  pub path: Option<String>,
  pub domain: Option<String>,
  pub expires: Option<String>,
  pub same_site: Option<SameSite>,
  pub secure: bool,
  pub http_only: bool,
  pub max_age: Option<i64>,
}

impl Cookie {
  pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
    Cookie {
      name: name.into(),
      value: value.into(),
      path: None,
      domain: None,
      expires: None,
      same_site: None,
      secure: false,
      http_only: false,
      max_age: None,
    }
  }

  pub fn path(mut self, path: impl Into<String>) -> Self {
    self.path = Some(path.into());
    self
  }

  pub fn domain(mut self, domain: impl Into<String>) -> Self {
    self.domain = Some(domain.into());
    self
  }

  pub fn same_site(mut self, policy: SameSite) -> Self {
    self.same_site = Some(policy);
    self
  }

  pub fn secure(mut self, secure: bool) -> Self {
    self.secure = secure;
    self
  }

  pub fn http_only(mut self, http_only: bool) -> Self {
    self.http_only = http_only;
    self
  }

  pub fn max_age(mut self, seconds: i64) -> Self {
    self.max_age = Some(seconds);
    self
  }

  /// Sets `Max-Age=0` and an `Expires` timestamp in the past, per spec §3.
  pub fn mark_deleted(&mut self) {
    self.max_age = Some(0);
    self.expires = Some("Thu, 01 Jan 1970 00:00:00 GMT".to_string());
    self.value.clear();
  }

  /// Serializes to a single `Set-Cookie` header value. Attributes that are
  /// unset are omitted entirely (spec §6).
  pub fn to_header_value(&self) -> String {
    let mut out = format!("{}={}", self.name, self.value);
    if let Some(path) = &self.path {
      out.push_str("; Path=");
      out.push_str(path);
    }
    if let Some(domain) = &self.domain {
      out.push_str("; Domain=");
      out.push_str(domain);
    }
    if let Some(expires) = &self.expires {
      out.push_str("; Expires=");
      out.push_str(expires);
    }
    if let Some(max_age) = self.max_age {
      out.push_str("; Max-Age=");
      out.push_str(&max_age.to_string());
    }
    if let Some(same_site) = self.same_site {
      out.push_str("; SameSite=");
      out.push_str(&same_site.to_string());
    }
    if self.secure {
      out.push_str("; Secure");
    }
    if self.http_only {
      out.push_str("; HttpOnly");
    }
    out
  }

  /// Parses a `Cookie:` request header value (`name=value; name2=value2`)
  /// into a name -> Cookie table. Request cookies carry no attributes.
  pub fn parse_request_header(value: &str) -> Vec<Cookie> {
    value
      .split(';')
      .filter_map(|pair| {
        let pair = pair.trim();
        if pair.is_empty() {
          return None;
        }
        let (name, val) = pair.split_once('=')?;
        Some(Cookie::new(name.trim(), val.trim()))
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn serializes_only_set_attributes() {
    let cookie = Cookie::new("session", "abc123");
    assert_eq!(cookie.to_header_value(), "session=abc123");
  }

  #[test]
  fn serializes_all_attributes_when_set() {
    let cookie = Cookie::new("session", "abc123")
      .path("/")
      .domain("example.com")
      .same_site(SameSite::Strict)
      .secure(true)
      .http_only(true)
      .max_age(3600);
    let header = cookie.to_header_value();
    assert!(header.contains("Path=/"));
    assert!(header.contains("Domain=example.com"));
    assert!(header.contains("SameSite=Strict"));
    assert!(header.contains("Secure"));
    assert!(header.contains("HttpOnly"));
    assert!(header.contains("Max-Age=3600"));
  }

  #[test]
  fn mark_deleted_sets_max_age_zero_and_past_expiry() {
    let mut cookie = Cookie::new("session", "abc123");
    cookie.mark_deleted();
    assert_eq!(cookie.max_age, Some(0));
    assert!(cookie.expires.is_some());
    assert!(cookie.value.is_empty());
  }

  #[test]
  fn parses_request_cookie_header() {
    let cookies = Cookie::parse_request_header("a=1; b=2;c=3");
    assert_eq!(cookies.len(), 3);
    assert_eq!(cookies[1].name, "b");
    assert_eq!(cookies[1].value, "2");
  }
}
