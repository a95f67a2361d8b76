//! Requester metadata: network address and user agent.
//!
//! The address prefers `X-Forwarded-For` (first hop), then `X-Real-IP`, then
//! the socket peer, then `"unknown"`. Forwarded headers are client-supplied
//! and spoofable; the address is a best-effort signal for rate limiting and
//! hashing, never an identity.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{HeaderMap, header, request::Parts},
};

pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMeta {
  pub addr:       String,
  pub user_agent: String,
}

impl ClientMeta {
  pub fn from_parts(parts: &Parts) -> Self {
    let peer = parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| *addr);
    Self::from_headers(&parts.headers, peer)
  }

  pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
    let header_str = |name: &str| {
      headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    };

    let addr = header_str("x-forwarded-for")
      .and_then(|v| v.split(',').next())
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .or_else(|| header_str("x-real-ip"))
      .map(str::to_owned)
      .or_else(|| peer.map(|p| p.ip().to_string()))
      .unwrap_or_else(|| UNKNOWN.to_owned());

    let user_agent = headers
      .get(header::USER_AGENT)
      .and_then(|v| v.to_str().ok())
      .unwrap_or(UNKNOWN)
      .to_owned();

    Self { addr, user_agent }
  }
}

impl<St: Send + Sync> FromRequestParts<St> for ClientMeta {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &St) -> Result<Self, Self::Rejection> {
    Ok(Self::from_parts(parts))
  }
}
