//! Fixed-window request counting per client key.
//!
//! The first request for a key opens a window of `window` length; up to
//! `limit` requests are allowed inside it; the window resets unconditionally
//! once it has passed. Bursts of up to twice the limit across a window
//! boundary are accepted behaviour.

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use axum::{extract::FromRequestParts, http::request::Parts};
use hoarding_core::store::AdStore;
use tokio::time::Instant;

use crate::{AppState, client::ClientMeta, error::Error, sweep::Sweep};

/// The outcome of one [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
  pub allowed:   bool,
  /// Requests left in the current window after this one.
  pub remaining: u32,
  pub reset_at:  Instant,
}

impl Decision {
  /// Time until the current window closes.
  pub fn retry_after(&self) -> Duration {
    self.reset_at.saturating_duration_since(Instant::now())
  }
}

struct Bucket {
  count:    u32,
  reset_at: Instant,
}

#[derive(Default)]
pub struct RateLimiter {
  buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
  pub fn new() -> Self { Self::default() }

  fn buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
    self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Count one request for `key` and decide whether it may proceed.
  ///
  /// The read-modify-write happens under a single lock acquisition.
  pub fn check(&self, key: &str, limit: u32, window: Duration) -> Decision {
    let now = Instant::now();
    let mut buckets = self.buckets();

    if limit == 0 {
      let reset_at = buckets.get(key).map_or(now + window, |b| b.reset_at);
      return Decision { allowed: false, remaining: 0, reset_at };
    }

    if let Some(b) = buckets.get_mut(key).filter(|b| now <= b.reset_at) {
      if b.count >= limit {
        return Decision { allowed: false, remaining: 0, reset_at: b.reset_at };
      }
      b.count += 1;
      return Decision { allowed: true, remaining: limit - b.count, reset_at: b.reset_at };
    }

    let reset_at = now + window;
    buckets.insert(key.to_owned(), Bucket { count: 1, reset_at });
    Decision { allowed: true, remaining: limit - 1, reset_at }
  }

  /// Drop buckets whose window has passed.
  pub fn cleanup(&self) -> usize {
    let now = Instant::now();
    let mut buckets = self.buckets();
    let before = buckets.len();
    buckets.retain(|_, b| now <= b.reset_at);
    before - buckets.len()
  }

  pub fn len(&self) -> usize { self.buckets().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Sweep for RateLimiter {
  fn name(&self) -> &'static str { "rate-limiter" }

  fn sweep(&self) -> usize { self.cleanup() }
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// Present in a handler means the caller was within its write quota. The
/// rejection is [`Error::Throttled`].
pub struct WithinLimit(pub Decision);

impl<S> FromRequestParts<AppState<S>> for WithinLimit
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let client = ClientMeta::from_parts(parts);
    let policy = &state.config.rate_limit;
    let decision = state.limiter.check(&client.addr, policy.limit, policy.window());
    if decision.allowed {
      Ok(WithinLimit(decision))
    } else {
      tracing::info!(path = %parts.uri.path(), "rate limit exceeded");
      Err(Error::Throttled { retry_after: decision.retry_after() })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const WINDOW: Duration = Duration::from_millis(60_000);

  #[tokio::test(start_paused = true)]
  async fn at_most_limit_requests_per_window() {
    let rl = RateLimiter::new();
    let decisions: Vec<_> = (0..3).map(|_| rl.check("1.2.3.4", 3, WINDOW)).collect();
    assert!(decisions.iter().all(|d| d.allowed));
    assert_eq!(decisions.iter().map(|d| d.remaining).collect::<Vec<_>>(), vec![2, 1, 0]);

    let denied = rl.check("1.2.3.4", 3, WINDOW);
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(!rl.check("1.2.3.4", 3, WINDOW).allowed);
  }

  #[tokio::test(start_paused = true)]
  async fn window_resets_after_it_passes() {
    let rl = RateLimiter::new();
    for _ in 0..2 {
      rl.check("k", 2, WINDOW);
    }
    assert!(!rl.check("k", 2, WINDOW).allowed);

    // Still inside the window at exactly the reset instant.
    tokio::time::advance(WINDOW).await;
    assert!(!rl.check("k", 2, WINDOW).allowed);

    tokio::time::advance(Duration::from_millis(1)).await;
    let fresh = rl.check("k", 2, WINDOW);
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 1);
  }

  #[tokio::test(start_paused = true)]
  async fn boundary_burst_is_allowed() {
    let rl = RateLimiter::new();
    tokio::time::advance(Duration::from_millis(59_999)).await;
    assert!(rl.check("k", 1, WINDOW).allowed);
    tokio::time::advance(Duration::from_millis(60_001)).await;
    assert!(rl.check("k", 1, WINDOW).allowed);
  }

  #[tokio::test]
  async fn keys_are_independent() {
    let rl = RateLimiter::new();
    assert!(rl.check("a", 1, WINDOW).allowed);
    assert!(!rl.check("a", 1, WINDOW).allowed);
    assert!(rl.check("b", 1, WINDOW).allowed);
  }

  #[tokio::test]
  async fn zero_limit_denies_everything() {
    let rl = RateLimiter::new();
    assert!(!rl.check("k", 0, WINDOW).allowed);
    assert!(rl.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn retry_after_counts_down_to_reset() {
    let rl = RateLimiter::new();
    rl.check("k", 1, WINDOW);
    tokio::time::advance(Duration::from_secs(20)).await;
    let denied = rl.check("k", 1, WINDOW);
    assert_eq!(denied.retry_after(), Duration::from_secs(40));
  }

  #[tokio::test(start_paused = true)]
  async fn cleanup_drops_closed_windows() {
    let rl = RateLimiter::new();
    rl.check("old", 5, Duration::from_secs(1));
    rl.check("new", 5, Duration::from_secs(100));
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(rl.cleanup(), 1);
    assert_eq!(rl.len(), 1);
  }
}
