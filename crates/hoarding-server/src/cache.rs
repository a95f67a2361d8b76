//! In-process key→value cache with per-entry expiry.
//!
//! Expiry is checked lazily on every read; [`TtlCache::cleanup`] only exists
//! to bound memory and is normally driven by a [`crate::sweep::Sweeper`].

use std::{
  collections::HashMap,
  future::Future,
  hash::Hash,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use tokio::time::Instant;

use crate::sweep::Sweep;

/// Five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Entry<V> {
  value:      V,
  expires_at: Instant,
}

pub struct TtlCache<K, V> {
  entries:     Mutex<HashMap<K, Entry<V>>>,
  /// Per-key gates held while a read-through load is in flight.
  loading:     Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
  default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
  K: Eq + Hash + Clone,
  V: Clone,
{
  pub fn new(default_ttl: Duration) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      loading: Mutex::new(HashMap::new()),
      default_ttl,
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn loading(&self) -> MutexGuard<'_, HashMap<K, Arc<tokio::sync::Mutex<()>>>> {
    self.loading.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store `value` until `ttl` (or the default TTL) from now.
  pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
    let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
    self.entries().insert(key, Entry { value, expires_at });
  }

  /// The live value for `key`. A stale entry is evicted and reported as a
  /// miss.
  pub fn get(&self, key: &K) -> Option<V> {
    let mut entries = self.entries();
    match entries.get(key) {
      Some(e) if Instant::now() < e.expires_at => Some(e.value.clone()),
      Some(_) => {
        entries.remove(key);
        None
      }
      None => None,
    }
  }

  pub fn delete(&self, key: &K) -> bool { self.entries().remove(key).is_some() }

  /// Remove `key` and return its value if it was still live.
  pub fn take(&self, key: &K) -> Option<V> {
    let entry = self.entries().remove(key)?;
    (Instant::now() < entry.expires_at).then_some(entry.value)
  }

  pub fn clear(&self) { self.entries().clear(); }

  /// Number of stored entries, including expired ones not yet swept.
  pub fn len(&self) -> usize { self.entries().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Drop every expired entry and return how many were removed.
  pub fn cleanup(&self) -> usize {
    let now = Instant::now();
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, e| now < e.expires_at);
    before - entries.len()
  }

  /// Read-through lookup.
  ///
  /// On a miss, concurrent callers for the same key queue on a per-key gate
  /// so `load` runs once; later callers observe the value it stored. Errors
  /// are returned to the caller that hit them and are not cached. No map
  /// lock is held while `load` is awaited.
  pub async fn get_or_try_insert_with<F, Fut, E>(
    &self,
    key: K,
    ttl: Option<Duration>,
    load: F,
  ) -> Result<V, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    if let Some(v) = self.get(&key) {
      return Ok(v);
    }

    let gate = self.loading().entry(key.clone()).or_default().clone();
    let guard = gate.lock().await;

    let result = match self.get(&key) {
      Some(v) => Ok(v),
      None => {
        let loaded = load().await;
        if let Ok(v) = &loaded {
          self.set(key.clone(), v.clone(), ttl);
        }
        loaded
      }
    };

    // Retire the gate unless another caller is already queued on it.
    {
      let mut loading = self.loading();
      if loading
        .get(&key)
        .is_some_and(|g| Arc::ptr_eq(g, &gate) && Arc::strong_count(g) == 2)
      {
        loading.remove(&key);
      }
    }
    drop(guard);

    result
  }
}

impl<K, V> Sweep for TtlCache<K, V>
where
  K: Eq + Hash + Clone + Send + 'static,
  V: Clone + Send + 'static,
{
  fn name(&self) -> &'static str { "ttl-cache" }

  fn sweep(&self) -> usize { self.cleanup() }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  fn cache() -> TtlCache<String, u32> { TtlCache::new(Duration::from_secs(60)) }

  #[tokio::test(start_paused = true)]
  async fn value_is_served_until_ttl_elapses() {
    let c = cache();
    c.set("k".into(), 7, Some(Duration::from_secs(10)));

    tokio::time::advance(Duration::from_secs(9)).await;
    assert_eq!(c.get(&"k".to_string()), Some(7));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(c.get(&"k".to_string()), None);
    assert!(c.is_empty(), "stale entry is evicted on read");
  }

  #[tokio::test(start_paused = true)]
  async fn default_ttl_applies_when_unspecified() {
    let c = cache();
    c.set("k".into(), 1, None);
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(c.get(&"k".to_string()), Some(1));
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(c.get(&"k".to_string()), None);
  }

  #[tokio::test]
  async fn delete_and_clear() {
    let c = cache();
    c.set("a".into(), 1, None);
    c.set("b".into(), 2, None);
    assert!(c.delete(&"a".to_string()));
    assert!(!c.delete(&"a".to_string()));
    assert_eq!(c.get(&"a".to_string()), None);
    c.clear();
    assert!(c.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn take_consumes_live_entries_only() {
    let c = cache();
    c.set("live".into(), 1, None);
    c.set("stale".into(), 2, Some(Duration::from_secs(1)));
    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(c.take(&"live".to_string()), Some(1));
    assert_eq!(c.take(&"live".to_string()), None);
    assert_eq!(c.take(&"stale".to_string()), None);
    assert!(c.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn cleanup_removes_only_expired_entries() {
    let c = cache();
    c.set("short".into(), 1, Some(Duration::from_secs(1)));
    c.set("long".into(), 2, Some(Duration::from_secs(100)));

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(c.cleanup(), 1);
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(&"long".to_string()), Some(2));
  }

  #[tokio::test]
  async fn read_through_populates_once() {
    let c = cache();
    let calls = &AtomicUsize::new(0);
    for _ in 0..3 {
      let v = c
        .get_or_try_insert_with("k".into(), None, || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, ()>(42)
        })
        .await
        .unwrap();
      assert_eq!(v, 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn concurrent_misses_are_coalesced() {
    let c = Arc::new(cache());
    let calls = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
      .map(|_| {
        let c = c.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
          c.get_or_try_insert_with("k".into(), None, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<_, ()>(9)
          })
          .await
        })
      })
      .collect();

    for t in tasks {
      assert_eq!(t.await.unwrap(), Ok(9));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(c.loading().is_empty(), "gates are retired");
  }

  #[tokio::test]
  async fn load_errors_are_not_cached() {
    let c = cache();
    let err = c
      .get_or_try_insert_with("k".into(), None, || async { Err::<u32, _>("down") })
      .await;
    assert_eq!(err, Err("down"));
    assert_eq!(c.get(&"k".to_string()), None);

    let ok = c
      .get_or_try_insert_with("k".into(), None, || async { Ok::<_, &str>(3) })
      .await;
    assert_eq!(ok, Ok(3));
  }
}
