//! Error types and axum `IntoResponse` implementation.

use std::time::Duration;

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header, header::InvalidHeaderValue},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// The data store failed underneath a best-effort lookup or write.
#[derive(Debug, Error)]
#[error("tracking store error: {0}")]
pub struct TrackingError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl TrackingError {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self(Box::new(e))
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("rate limit exceeded")]
  Throttled { retry_after: Duration },
  #[error(transparent)]
  Tracking(#[from] TrackingError),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("invalid header value: {0}")]
  Header(#[from] InvalidHeaderValue),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"hoarding\""),
        );
        res
      }
      Error::BadRequest(msg) => {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
      }
      Error::Throttled { retry_after } => {
        let mut res = (
          StatusCode::TOO_MANY_REQUESTS,
          Json(json!({
            "error":     "rate limit exceeded",
            "throttled": true,
            "remaining": 0,
          })),
        )
          .into_response();
        // Round up so clients never retry inside the window.
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        res.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        res
      }
      Error::Tracking(e) => {
        tracing::error!(error = %e, "tracking failed");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "success": false, "error": "failed to record event" })),
        )
          .into_response()
      }
      Error::Store(e) => {
        tracing::error!(error = %e, "store error");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "error": "internal server error" })),
        )
          .into_response()
      }
      Error::Header(e) => {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
          .into_response()
      }
    }
  }
}
