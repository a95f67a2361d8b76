//! Pseudo-anonymous session identity carried in the `session_id` cookie.
//!
//! The id is a correlation key for impressions and clicks only. It is minted
//! by the server, unauthenticated, and must never drive an authorization
//! decision.

use std::time::Duration;

use axum::http::{HeaderValue, header::InvalidHeaderValue};
use uuid::Uuid;

use crate::cookies::{CookieJar, SetCookie};

pub const SESSION_COOKIE: &str = "session_id";

/// One year.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
  pub id:     Uuid,
  /// `true` if the id was created for this request and must be echoed back.
  pub minted: bool,
}

impl Session {
  /// The session id the client already holds. A value that is not a UUID is
  /// treated as absent.
  pub fn existing(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE).and_then(|v| Uuid::parse_str(v).ok())
  }

  pub fn resume_or_mint(jar: &CookieJar) -> Self {
    match Self::existing(jar) {
      Some(id) => Self { id, minted: false },
      None => Self { id: Uuid::new_v4(), minted: true },
    }
  }

  /// `Set-Cookie` for a freshly minted session; `None` when the client
  /// already has it.
  pub fn set_cookie(&self) -> Result<Option<HeaderValue>, InvalidHeaderValue> {
    if !self.minted {
      return Ok(None);
    }
    let id = self.id.to_string();
    SetCookie {
      name:      SESSION_COOKIE,
      value:     &id,
      max_age:   SESSION_MAX_AGE,
      http_only: true,
    }
    .to_header_value()
    .map(Some)
  }
}

#[cfg(test)]
mod tests {
  use axum::http::{HeaderMap, header};

  use super::*;

  fn jar(cookie: &str) -> CookieJar {
    let mut h = HeaderMap::new();
    h.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
    CookieJar::from_headers(&h)
  }

  #[test]
  fn resumes_existing_session() {
    let id = Uuid::new_v4();
    let s = Session::resume_or_mint(&jar(&format!("session_id={id}")));
    assert_eq!(s, Session { id, minted: false });
    assert_eq!(s.set_cookie().unwrap(), None);
  }

  #[test]
  fn mints_when_absent_or_garbage() {
    for j in [CookieJar::default(), jar("session_id=not-a-uuid")] {
      let s = Session::resume_or_mint(&j);
      assert!(s.minted);
      let cookie = s.set_cookie().unwrap().unwrap();
      let cookie = cookie.to_str().unwrap();
      assert!(cookie.starts_with(&format!("session_id={}", s.id)), "{cookie}");
      assert!(cookie.contains("Max-Age=31536000"), "{cookie}");
      assert!(cookie.contains("HttpOnly"), "{cookie}");
    }
  }
}
