//! HTTP service for consent-gated ad delivery and analytics.
//!
//! Exposes an axum [`Router`] backed by any [`AdStore`]. Every component is
//! owned by [`AppState`] and injected into handlers; nothing is global.

pub mod auth;
pub mod cache;
pub mod client;
pub mod consent;
pub mod cookies;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod privacy;
pub mod rate_limit;
pub mod resolver;
pub mod session;
pub mod sweep;
pub mod tracker;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};
use hoarding_core::store::AdStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;
use consent::ConsentStore;
use delivery::AdDelivery;
use privacy::IpHasher;
use rate_limit::RateLimiter;
use resolver::{AdResolver, LookupCache};
use sweep::Sweeper;
use tracker::ImpressionTracker;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `HOARDING_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  /// Prepended to addresses before hashing. Unset means plain SHA-256.
  #[serde(default)]
  pub ip_hash_salt:       Option<String>,
  #[serde(default)]
  pub cache:              CacheConfig,
  #[serde(default)]
  pub rate_limit:         RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
  pub default_ttl_secs:      u64,
  /// TTL for slot and ad lookups.
  pub lookup_ttl_secs:       u64,
  pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_secs:      cache::DEFAULT_TTL.as_secs(),
      lookup_ttl_secs:       resolver::LOOKUP_TTL.as_secs(),
      cleanup_interval_secs: 600,
    }
  }
}

impl CacheConfig {
  pub fn default_ttl(&self) -> Duration { Duration::from_secs(self.default_ttl_secs) }

  pub fn lookup_ttl(&self) -> Duration { Duration::from_secs(self.lookup_ttl_secs) }

  pub fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval_secs.max(1))
  }
}

/// Quota for the write endpoints, per client address.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
  pub limit:                 u32,
  pub window_ms:             u64,
  pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self { limit: 10, window_ms: 60_000, cleanup_interval_secs: 60 }
  }
}

impl RateLimitConfig {
  pub fn window(&self) -> Duration { Duration::from_millis(self.window_ms) }

  pub fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval_secs.max(1))
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: AdStore> {
  pub store:    Arc<S>,
  pub config:   Arc<ServerConfig>,
  pub auth:     Arc<AuthConfig>,
  pub delivery: Arc<AdDelivery<S>>,
  pub limiter:  Arc<RateLimiter>,
  pub cache:    Arc<LookupCache>,
}

impl<S> AppState<S>
where
  S: AdStore + 'static,
{
  pub fn new(store: S, config: ServerConfig) -> Self {
    let store = Arc::new(store);
    let hasher = IpHasher::new(config.ip_hash_salt.clone());
    let cache = Arc::new(LookupCache::new(config.cache.default_ttl()));

    let delivery = AdDelivery::new(
      AdResolver::new(store.clone(), cache.clone(), config.cache.lookup_ttl()),
      ImpressionTracker::new(store.clone(), hasher.clone()),
      ConsentStore::new(store.clone(), hasher),
    );

    Self {
      auth: Arc::new(AuthConfig {
        username:      config.auth_username.clone(),
        password_hash: config.auth_password_hash.clone(),
      }),
      store,
      config: Arc::new(config),
      delivery: Arc::new(delivery),
      limiter: Arc::new(RateLimiter::new()),
      cache,
    }
  }

  /// Start periodic cleanup of the lookup cache, the served-ad log and the
  /// rate limiter. The sweeps run until the returned handles are dropped.
  pub fn spawn_sweepers(&self) -> Vec<Sweeper> {
    vec![
      Sweeper::spawn(&self.cache, self.config.cache.cleanup_interval()),
      Sweeper::spawn(&self.delivery.served, delivery::SERVED_WINDOW),
      Sweeper::spawn(&self.limiter, self.config.rate_limit.cleanup_interval()),
    ]
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the service.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  Router::new()
    // Ads
    .route("/ads", get(handlers::ads::get_ad::<S>))
    .route("/ads/impression", post(handlers::ads::impression::<S>))
    .route("/ads/click", post(handlers::ads::click::<S>))
    .route("/ads/stats", get(handlers::stats::ad_stats::<S>))
    // Consent
    .route(
      "/consent",
      get(handlers::consent::list::<S>).post(handlers::consent::record::<S>),
    )
    .route(
      "/consent/preferences",
      get(handlers::consent::read_preferences::<S>)
        .post(handlers::consent::write_preferences::<S>),
    )
    // Banner
    .route("/cookie-settings", get(handlers::settings::cookie_settings::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use rand_core::OsRng;

  use super::*;

  pub fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string()
  }

  pub fn test_config() -> ServerConfig {
    ServerConfig {
      host:               "127.0.0.1".to_string(),
      port:               8080,
      store_path:         PathBuf::from(":memory:"),
      auth_username:      "admin".to_string(),
      auth_password_hash: String::new(),
      ip_hash_salt:       None,
      cache:              CacheConfig::default(),
      rate_limit:         RateLimitConfig::default(),
    }
  }
}

// ─── Integration tests ────────────────────────────────────────────────────────
