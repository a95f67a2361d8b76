//! Route handlers, one module per resource.

pub mod ads;
pub mod consent;
pub mod settings;
pub mod stats;

use axum::{
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};

/// Attach each `Set-Cookie` value to `body`'s response.
pub(crate) fn with_cookies(
  body:    impl IntoResponse,
  cookies: impl IntoIterator<Item = HeaderValue>,
) -> Response {
  let mut res = body.into_response();
  for cookie in cookies {
    res.headers_mut().append(header::SET_COOKIE, cookie);
  }
  res
}
