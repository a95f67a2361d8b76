//! Impression and click recording.
//!
//! Tracking is best-effort: failures are logged and returned to the caller,
//! never retried, and never allowed to stand between a visitor and the ad or
//! the click-through.

use std::sync::Arc;

use hoarding_core::{
  impression::{Impression, NewImpression},
  store::AdStore,
};
use uuid::Uuid;

use crate::{error::TrackingError, privacy::IpHasher};

/// What [`ImpressionTracker::record_click`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
  /// This impression went from unclicked to clicked.
  Attributed(Uuid),
  /// Nothing left to mark: a replayed click, or no impression was recorded.
  NoEligibleImpression,
}

impl ClickOutcome {
  pub fn is_attributed(&self) -> bool { matches!(self, Self::Attributed(_)) }
}

pub struct ImpressionTracker<S> {
  store:  Arc<S>,
  hasher: IpHasher,
}

impl<S> Clone for ImpressionTracker<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), hasher: self.hasher.clone() }
  }
}

impl<S: AdStore> ImpressionTracker<S> {
  pub fn new(store: Arc<S>, hasher: IpHasher) -> Self { Self { store, hasher } }

  /// Record that `ad_id` was shown to `session_id`.
  ///
  /// `raw_ip` is hashed here and goes no further.
  pub async fn record_impression(
    &self,
    ad_id:      Uuid,
    slot_id:    Option<Uuid>,
    session_id: Uuid,
    raw_ip:     &str,
    user_agent: &str,
  ) -> Result<Impression, TrackingError> {
    let input = NewImpression {
      ad_id,
      ad_slot_id: slot_id,
      session_id,
      ip_hash: self.hasher.hash(raw_ip),
      user_agent: user_agent.to_owned(),
    };

    match self.store.insert_impression(input).await {
      Ok(impression) => {
        tracing::debug!(%ad_id, impression_id = %impression.id, "impression recorded");
        Ok(impression)
      }
      Err(e) => {
        tracing::warn!(%ad_id, error = %e, "failed to record impression");
        Err(TrackingError::store(e))
      }
    }
  }

  /// Attribute a click to the most recent unclicked impression of `ad_id`
  /// for `session_id`. Safe to replay.
  pub async fn record_click(
    &self,
    ad_id:      Uuid,
    session_id: Uuid,
  ) -> Result<ClickOutcome, TrackingError> {
    match self.store.mark_latest_clicked(ad_id, session_id).await {
      Ok(Some(impression_id)) => {
        tracing::debug!(%ad_id, %impression_id, "click attributed");
        Ok(ClickOutcome::Attributed(impression_id))
      }
      Ok(None) => {
        tracing::debug!(%ad_id, "click with no eligible impression");
        Ok(ClickOutcome::NoEligibleImpression)
      }
      Err(e) => {
        tracing::warn!(%ad_id, error = %e, "failed to record click");
        Err(TrackingError::store(e))
      }
    }
  }
}
