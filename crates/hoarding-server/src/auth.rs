//! HTTP Basic auth for the reporting endpoints.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use hoarding_core::store::AdStore;

use crate::{AppState, error::Error};

/// The one operator account.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// argon2 PHC string, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Present in a handler means the request carried valid operator
/// credentials.
pub struct Authenticated;

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let encoded = value.strip_prefix("Basic ")?;
  let decoded = String::from_utf8(B64.decode(encoded.trim()).ok()?).ok()?;
  let (user, pass) = decoded.split_once(':')?;
  Some((user.to_owned(), pass.to_owned()))
}

pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  let (username, password) = basic_credentials(headers).ok_or(Error::Unauthorized)?;
  if username != config.username {
    return Err(Error::Unauthorized);
  }

  let hash = PasswordHash::new(&config.password_hash).map_err(|e| {
    tracing::error!(error = %e, "configured password hash is not a valid PHC string");
    Error::Unauthorized
  })?;
  Argon2::default()
    .verify_password(password.as_bytes(), &hash)
    .map_err(|_| Error::Unauthorized)
}

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth)?;
    Ok(Authenticated)
  }
}

#[cfg(test)]
mod tests {
  use axum::{body::Body, http::Request};
  use hoarding_store_sqlite::SqliteStore;

  use super::*;
  use crate::test_support::{hash_password, test_config};

  async fn state(password: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let mut config = test_config();
    config.auth_password_hash = hash_password(password);
    AppState::new(store, config)
  }

  async fn extract(req: Request<Body>, state: &AppState<SqliteStore>) -> Result<Authenticated, Error> {
    let (mut parts, _) = req.into_parts();
    Authenticated::from_request_parts(&mut parts, state).await
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  fn with_auth(value: &str) -> Request<Body> {
    Request::builder()
      .header(header::AUTHORIZATION, value)
      .body(Body::empty())
      .unwrap()
  }

  #[tokio::test]
  async fn correct_credentials() {
    let state = state("secret").await;
    assert!(extract(with_auth(&basic("admin", "secret")), &state).await.is_ok());
  }

  #[tokio::test]
  async fn wrong_password_or_user() {
    let state = state("secret").await;
    for value in [basic("admin", "wrong"), basic("root", "secret")] {
      assert!(matches!(extract(with_auth(&value), &state).await, Err(Error::Unauthorized)));
    }
  }

  #[tokio::test]
  async fn missing_or_malformed_header() {
    let state = state("secret").await;
    let bare = Request::builder().body(Body::empty()).unwrap();
    assert!(matches!(extract(bare, &state).await, Err(Error::Unauthorized)));

    for value in ["Basic !!!not-base64!!!", "Bearer abc", "Basic YWRtaW4="] {
      assert!(matches!(extract(with_auth(value), &state).await, Err(Error::Unauthorized)));
    }
  }

  #[tokio::test]
  async fn invalid_configured_hash_rejects() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let mut config = test_config();
    config.auth_password_hash = "not-a-phc-string".into();
    let state = AppState::new(store, config);
    assert!(matches!(
      extract(with_auth(&basic("admin", "secret")), &state).await,
      Err(Error::Unauthorized)
    ));
  }
}
