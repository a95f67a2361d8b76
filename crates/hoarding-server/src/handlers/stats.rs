//! `GET /ads/stats`: impression and click totals for operators.

use axum::{Json, extract::State};
use hoarding_core::store::AdStore;
use serde_json::json;

use crate::{AppState, auth::Authenticated, error::Error};

/// `GET /ads/stats`. `ctr` is a percentage.
pub async fn ad_stats<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
) -> Result<Json<serde_json::Value>, Error>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let stats = state
    .store
    .impression_stats()
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;
  Ok(Json(json!({
    "impressions":  stats.impressions,
    "clicks":       stats.clicks,
    "ctr":          stats.ctr(),
    "active_slots": stats.active_slots,
  })))
}
