//! The HTTP exchange (spec §3): a request paired 1:1 with its response,
//! handed to every matching `HttpHandler` for the lifetime of one dispatch.

use crate::request::Request;
use crate::response::Response;

pub struct Exchange {
  pub request: Request,
  pub response: Response,
}

impl Exchange {
  pub fn new(request: Request) -> Self {
    let can_carry_body = request.method.can_carry_response_body();
    let mut response = Response::new(can_carry_body);
    response.set_pretty_json(request.wants_pretty_json());
    Exchange { request, response }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::body::BodyHandle;
  use crate::method::Method;
  use crate::request::HeaderMap;

  #[test]
  fn head_request_gets_a_response_that_forbids_a_body() {
    let request = Request::new(
      "/".to_string(),
      HeaderMap::new(),
      "127.0.0.1".to_string(),
      Method::Head,
      BodyHandle::empty(),
    );
    let mut exchange = Exchange::new(request);
    assert!(exchange.response.print_bytes(b"x").is_err());
  }
}
