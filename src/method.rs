//! HTTP method tokens (spec §3: "the set of method tokens accepted").

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
  Head,
  Options,
  Connect,
  Trace,
  /// Any token the parser doesn't recognize. A response body cannot be
  /// written for a request carrying this method (spec §4.F).
  Unknown,
}

impl Method {
  /// HEAD and UNKNOWN requests cannot carry a response body (spec §4.F).
  pub fn can_carry_response_body(&self) -> bool {
    !matches!(self, Method::Head | Method::Unknown)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Head => "HEAD",
      Method::Options => "OPTIONS",
      Method::Connect => "CONNECT",
      Method::Trace => "TRACE",
      Method::Unknown => "UNKNOWN",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Method {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.to_ascii_uppercase().as_str() {
      "GET" => Method::Get,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "PATCH" => Method::Patch,
      "DELETE" => Method::Delete,
      "HEAD" => Method::Head,
      "OPTIONS" => Method::Options,
      "CONNECT" => Method::Connect,
      "TRACE" => Method::Trace,
      _ => Method::Unknown,
    })
  }
}
