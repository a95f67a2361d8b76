//! Position → (slot, ad) resolution with a read-through cache.
//!
//! Both lookups are cached for a short TTL, and so are the "nothing here"
//! answers, so an edit to a slot or ad can take up to that TTL to show.
//! Store failures are not cached: the next request retries.

use std::{sync::Arc, time::Duration};

use hoarding_core::{
  ad::{Ad, AdSlot, Placement, Position},
  store::AdStore,
};
use uuid::Uuid;

use crate::{cache::TtlCache, error::TrackingError};

/// One minute.
pub const LOOKUP_TTL: Duration = Duration::from_secs(60);

/// A cached answer from the store.
#[derive(Debug, Clone)]
pub enum Lookup {
  Slot(Option<AdSlot>),
  Ad(Option<Ad>),
}

pub type LookupCache = TtlCache<String, Lookup>;

fn slot_key(position: Position) -> String { format!("slot:{position}") }

fn ad_key(slot_id: Uuid) -> String { format!("ad:{slot_id}") }

pub struct AdResolver<S> {
  store: Arc<S>,
  cache: Arc<LookupCache>,
  ttl:   Duration,
}

impl<S> Clone for AdResolver<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), cache: self.cache.clone(), ttl: self.ttl }
  }
}

impl<S: AdStore> AdResolver<S> {
  pub fn new(store: Arc<S>, cache: Arc<LookupCache>, ttl: Duration) -> Self {
    Self { store, cache, ttl }
  }

  /// The first active slot for `position`.
  pub async fn slot_for(&self, position: Position) -> Result<Option<AdSlot>, TrackingError> {
    let lookup = self
      .cache
      .get_or_try_insert_with(slot_key(position), Some(self.ttl), || async move {
        self
          .store
          .find_active_slot(position)
          .await
          .map(Lookup::Slot)
          .map_err(TrackingError::store)
      })
      .await?;
    Ok(match lookup {
      Lookup::Slot(slot) => slot,
      Lookup::Ad(_) => None,
    })
  }

  /// The first active ad attached to `slot_id`.
  pub async fn ad_for(&self, slot_id: Uuid) -> Result<Option<Ad>, TrackingError> {
    let lookup = self
      .cache
      .get_or_try_insert_with(ad_key(slot_id), Some(self.ttl), || async move {
        self
          .store
          .find_active_ad(slot_id)
          .await
          .map(Lookup::Ad)
          .map_err(TrackingError::store)
      })
      .await?;
    Ok(match lookup {
      Lookup::Ad(ad) => ad,
      Lookup::Slot(_) => None,
    })
  }

  /// The slot and ad to show at `position`, if any.
  ///
  /// Never fails: a store error is logged and treated as "no ad".
  pub async fn resolve(&self, position: Position) -> Option<Placement> {
    let found = async {
      let Some(slot) = self.slot_for(position).await? else {
        return Ok(None);
      };
      let ad = self.ad_for(slot.id).await?;
      Ok::<_, TrackingError>(ad.map(|ad| Placement { slot, ad }))
    };

    match found.await {
      Ok(placement) => placement,
      Err(e) => {
        tracing::warn!(%position, error = %e, "ad lookup failed");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  use hoarding_core::{
    ad::{AdPayload, NewAd, NewSlot},
    consent::{ConsentRecord, NewConsentRecord},
    impression::{Impression, ImpressionStats, NewImpression},
  };
  use hoarding_store_sqlite::SqliteStore;

  use super::*;

  async fn seeded() -> (Arc<SqliteStore>, AdSlot, Ad) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let slot = store.insert_slot(NewSlot::active("top", Position::Header)).await.unwrap();
    let ad = store
      .insert_ad(NewAd::for_slot("Banner", &slot, AdPayload {
        title: Some("Hello".into()),
        ..Default::default()
      }))
      .await
      .unwrap();
    (store, slot, ad)
  }

  fn resolver<S: AdStore>(store: Arc<S>) -> AdResolver<S> {
    AdResolver::new(store, Arc::new(LookupCache::new(LOOKUP_TTL)), LOOKUP_TTL)
  }

  #[tokio::test]
  async fn resolves_active_slot_and_ad() {
    let (store, slot, ad) = seeded().await;
    let placement = resolver(store).resolve(Position::Header).await.unwrap();
    assert_eq!(placement.slot.id, slot.id);
    assert_eq!(placement.ad.id, ad.id);
    assert_eq!(placement.ad.payload.title.as_deref(), Some("Hello"));
  }

  #[tokio::test]
  async fn empty_position_resolves_to_none() {
    let (store, ..) = seeded().await;
    assert!(resolver(store).resolve(Position::Footer).await.is_none());
  }

  #[tokio::test]
  async fn slot_without_active_ad_resolves_to_none() {
    let (store, _, ad) = seeded().await;
    store.set_ad_active(ad.id, false).await.unwrap();
    assert!(resolver(store).resolve(Position::Header).await.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn cached_answer_may_be_stale_until_ttl() {
    let (store, _, ad) = seeded().await;
    let r = resolver(store.clone());
    assert!(r.resolve(Position::Header).await.is_some());

    store.set_ad_active(ad.id, false).await.unwrap();
    assert!(r.resolve(Position::Header).await.is_some(), "served from cache");

    tokio::time::advance(LOOKUP_TTL).await;
    assert!(r.resolve(Position::Header).await.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn negative_answers_are_cached_too() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let r = resolver(store.clone());
    assert!(r.resolve(Position::Hero).await.is_none());

    let slot = store.insert_slot(NewSlot::active("hero", Position::Hero)).await.unwrap();
    store
      .insert_ad(NewAd::for_slot("H", &slot, AdPayload::default()))
      .await
      .unwrap();
    assert!(r.resolve(Position::Hero).await.is_none());

    tokio::time::advance(LOOKUP_TTL).await;
    assert!(r.resolve(Position::Hero).await.is_some());
  }

  // ── Failure handling ─────────────────────────────────────────────────

  /// Counts slot lookups and fails them while `down` is set.
  #[derive(Default)]
  struct FlakyStore {
    down:  AtomicBool,
    calls: AtomicUsize,
  }

  #[derive(Debug, thiserror::Error)]
  #[error("store unavailable")]
  struct Unavailable;

  impl AdStore for FlakyStore {
    type Error = Unavailable;

    async fn insert_slot(&self, _: NewSlot) -> Result<AdSlot, Self::Error> { unimplemented!() }
    async fn find_active_slot(&self, _: Position) -> Result<Option<AdSlot>, Self::Error> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.down.load(Ordering::SeqCst) { Err(Unavailable) } else { Ok(None) }
    }
    async fn insert_ad(&self, _: NewAd) -> Result<Ad, Self::Error> { unimplemented!() }
    async fn find_active_ad(&self, _: Uuid) -> Result<Option<Ad>, Self::Error> { unimplemented!() }
    async fn set_ad_active(&self, _: Uuid, _: bool) -> Result<bool, Self::Error> { unimplemented!() }
    async fn insert_impression(&self, _: NewImpression) -> Result<Impression, Self::Error> { unimplemented!() }
    async fn get_impression(&self, _: Uuid) -> Result<Option<Impression>, Self::Error> { unimplemented!() }
    async fn mark_latest_clicked(&self, _: Uuid, _: Uuid) -> Result<Option<Uuid>, Self::Error> { unimplemented!() }
    async fn impression_stats(&self) -> Result<ImpressionStats, Self::Error> { unimplemented!() }
    async fn append_consent(&self, _: NewConsentRecord) -> Result<ConsentRecord, Self::Error> { unimplemented!() }
    async fn recent_consents(&self, _: usize) -> Result<Vec<ConsentRecord>, Self::Error> { unimplemented!() }
    async fn banner_text(&self) -> Result<Option<String>, Self::Error> { unimplemented!() }
    async fn set_banner_text(&self, _: String) -> Result<(), Self::Error> { unimplemented!() }
  }

  #[tokio::test]
  async fn store_errors_degrade_to_none_and_are_retried() {
    let store = Arc::new(FlakyStore::default());
    store.down.store(true, Ordering::SeqCst);
    let r = resolver(store.clone());

    assert!(r.resolve(Position::Sidebar).await.is_none());
    assert!(r.slot_for(Position::Sidebar).await.is_err());
    assert_eq!(store.calls.load(Ordering::SeqCst), 2, "failures are not cached");

    store.down.store(false, Ordering::SeqCst);
    assert!(r.resolve(Position::Sidebar).await.is_none());
    assert!(r.resolve(Position::Sidebar).await.is_none());
    assert_eq!(store.calls.load(Ordering::SeqCst), 3, "success is cached");
  }
}
