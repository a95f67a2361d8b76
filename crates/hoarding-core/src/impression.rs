//! Impressions: one ad delivered to one session.
//!
//! Rows are append-only apart from a single `clicked` transition
//! `false → true`, which can happen at most once per row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impression {
  pub id:         Uuid,
  pub ad_id:      Uuid,
  /// `None` when the slot could not be resolved at record time.
  pub ad_slot_id: Option<Uuid>,
  pub session_id: Uuid,
  /// One-way digest of the requester's address. The raw IP is never stored.
  pub ip_hash:    String,
  pub user_agent: String,
  pub clicked:    bool,
  pub created_at: DateTime<Utc>,
}

/// Input for [`crate::store::AdStore::insert_impression`]; `clicked` always
/// starts `false`.
#[derive(Debug, Clone)]
pub struct NewImpression {
  pub ad_id:      Uuid,
  pub ad_slot_id: Option<Uuid>,
  pub session_id: Uuid,
  pub ip_hash:    String,
  pub user_agent: String,
}

/// Totals for the admin performance panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpressionStats {
  pub impressions:  u64,
  pub clicks:       u64,
  pub active_slots: u64,
}

impl ImpressionStats {
  /// Click-through rate in percent, `0.0` when nothing was shown.
  pub fn ctr(&self) -> f64 {
    if self.impressions == 0 {
      return 0.0;
    }
    self.clicks as f64 / self.impressions as f64 * 100.0
  }
}
