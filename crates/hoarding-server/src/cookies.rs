//! Minimal cookie handling: parsing the `Cookie` request header and building
//! `Set-Cookie` values.
//!
//! Values are percent-encoded with the same unreserved set as JavaScript's
//! `encodeURIComponent`, so cookies written by the banner script and by this
//! server read back identically.

use std::{collections::HashMap, convert::Infallible, time::Duration};

use axum::{
  extract::FromRequestParts,
  http::{
    HeaderMap, HeaderValue,
    header::{self, InvalidHeaderValue},
    request::Parts,
  },
};
use chrono::Utc;

/// Cookies sent with a request, by name. The first occurrence of a name
/// wins.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
  cookies: HashMap<String, String>,
}

impl CookieJar {
  pub fn from_headers(headers: &HeaderMap) -> Self {
    let mut cookies = HashMap::new();
    for value in headers.get_all(header::COOKIE) {
      let Ok(value) = value.to_str() else { continue };
      for pair in value.split(';') {
        if let Some((name, val)) = pair.trim().split_once('=') {
          cookies
            .entry(name.trim().to_owned())
            .or_insert_with(|| val.trim().trim_matches('"').to_owned());
        }
      }
    }
    Self { cookies }
  }

  /// The raw (still percent-encoded) value of `name`.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.cookies.get(name).map(String::as_str)
  }
}

impl<St: Send + Sync> FromRequestParts<St> for CookieJar {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &St) -> Result<Self, Self::Rejection> {
    Ok(Self::from_headers(&parts.headers))
  }
}

// ─── Set-Cookie ──────────────────────────────────────────────────────────────

/// A `Set-Cookie` header. Always `Path=/` and `SameSite=Lax`.
#[derive(Debug, Clone)]
pub struct SetCookie<'a> {
  pub name:      &'a str,
  /// Written verbatim; encode with [`percent_encode`] first if needed.
  pub value:     &'a str,
  pub max_age:   Duration,
  /// Hide the cookie from page scripts.
  pub http_only: bool,
}

impl SetCookie<'_> {
  pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
    let secs = self.max_age.as_secs();
    let expires = Utc::now() + chrono::Duration::seconds(secs as i64);
    let mut s = format!(
      "{}={}; Path=/; Max-Age={secs}; Expires={}; SameSite=Lax",
      self.name,
      self.value,
      expires.format("%a, %d %b %Y %H:%M:%S GMT"),
    );
    if self.http_only {
      s.push_str("; HttpOnly");
    }
    HeaderValue::from_str(&s)
  }
}

// ─── Percent encoding ────────────────────────────────────────────────────────

fn is_unreserved(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&b)
}

pub fn percent_encode(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for &b in s.as_bytes() {
    if is_unreserved(b) {
      out.push(b as char);
    } else {
      out.push_str(&format!("%{b:02X}"));
    }
  }
  out
}

/// Decode `%XX` escapes. `None` on a malformed escape or non-UTF-8 result.
pub fn percent_decode(s: &str) -> Option<String> {
  let bytes = s.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%' {
      let hex = bytes.get(i + 1..i + 3)?;
      if !hex.iter().all(u8::is_ascii_hexdigit) {
        return None;
      }
      let hex = std::str::from_utf8(hex).ok()?;
      out.push(u8::from_str_radix(hex, 16).ok()?);
      i += 3;
    } else {
      out.push(bytes[i]);
      i += 1;
    }
  }
  String::from_utf8(out).ok()
}
