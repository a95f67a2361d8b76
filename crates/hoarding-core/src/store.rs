//! The `AdStore` trait, the pipeline's only view of the data store.
//!
//! The trait is implemented by storage backends (e.g.
//! `hoarding-store-sqlite`). The server depends on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  ad::{Ad, AdSlot, NewAd, NewSlot, Position},
  consent::{ConsentRecord, NewConsentRecord},
  impression::{Impression, ImpressionStats, NewImpression},
};

/// Abstraction over the ad/analytics data store.
///
/// Impressions and consent records are append-only. The one permitted
/// mutation of an impression, marking it clicked, is exposed as a single
/// atomic conditional update ([`AdStore::mark_latest_clicked`]).
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait AdStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Slots & ads ───────────────────────────────────────────────────────

  fn insert_slot(
    &self,
    input: NewSlot,
  ) -> impl Future<Output = Result<AdSlot, Self::Error>> + Send + '_;

  /// The first active slot for `position`, oldest first.
  fn find_active_slot(
    &self,
    position: Position,
  ) -> impl Future<Output = Result<Option<AdSlot>, Self::Error>> + Send + '_;

  fn insert_ad(
    &self,
    input: NewAd,
  ) -> impl Future<Output = Result<Ad, Self::Error>> + Send + '_;

  /// The first active ad attached to `slot_id`, oldest first.
  fn find_active_ad(
    &self,
    slot_id: Uuid,
  ) -> impl Future<Output = Result<Option<Ad>, Self::Error>> + Send + '_;

  /// Toggle an ad. Returns `false` if no ad has that id.
  fn set_ad_active(
    &self,
    ad_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Impressions ───────────────────────────────────────────────────────

  /// Persist a new, unclicked impression. `created_at` is set by the store.
  fn insert_impression(
    &self,
    input: NewImpression,
  ) -> impl Future<Output = Result<Impression, Self::Error>> + Send + '_;

  fn get_impression(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Impression>, Self::Error>> + Send + '_;

  /// Mark the most recent unclicked impression for `(ad_id, session_id)` as
  /// clicked and return its id, or `None` if there is none.
  ///
  /// Must be a single atomic compare-and-set: two concurrent calls can never
  /// both claim the same row.
  fn mark_latest_clicked(
    &self,
    ad_id: Uuid,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  fn impression_stats(
    &self,
  ) -> impl Future<Output = Result<ImpressionStats, Self::Error>> + Send + '_;

  // ── Consent log ───────────────────────────────────────────────────────

  fn append_consent(
    &self,
    input: NewConsentRecord,
  ) -> impl Future<Output = Result<ConsentRecord, Self::Error>> + Send + '_;

  /// The newest `limit` consent records, newest first.
  fn recent_consents(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ConsentRecord>, Self::Error>> + Send + '_;

  // ── Banner settings ───────────────────────────────────────────────────

  fn banner_text(
    &self,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  fn set_banner_text(
    &self,
    text: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
