//! Handlers for `/consent` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/consent` | Basic auth; stats over the latest records |
//! | `POST` | `/consent` | Body: `{"session_id": …, "consent": {…}}`; rate-limited |
//! | `GET`  | `/consent/preferences` | Reads the `cookie_consent` cookie |
//! | `POST` | `/consent/preferences` | Body: preferences; sets the cookie; rate-limited |

use axum::{
  Json,
  extract::State,
  response::Response,
};
use hoarding_core::{
  consent::{ConsentPreferences, ConsentStats},
  store::AdStore,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::with_cookies;
use crate::{
  AppState, auth::Authenticated, client::ClientMeta, cookies::CookieJar, error::Error,
  rate_limit::WithinLimit, session::Session,
};

/// How many of the newest records `GET /consent` aggregates.
pub const STATS_WINDOW: usize = 1000;

// ─── Log ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecordBody {
  pub session_id: Option<Uuid>,
  pub consent:    Option<ConsentPreferences>,
}

/// `POST /consent`
pub async fn record<S>(
  _: WithinLimit,
  State(state): State<AppState<S>>,
  client: ClientMeta,
  Json(body): Json<RecordBody>,
) -> Result<Json<serde_json::Value>, Error>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let (Some(session_id), Some(consent)) = (body.session_id, body.consent) else {
    return Err(Error::BadRequest("session_id and consent required".into()));
  };
  state.delivery.consent.record(session_id, &client, consent).await?;
  Ok(Json(json!({ "success": true })))
}

/// `GET /consent`
pub async fn list<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
) -> Result<Json<serde_json::Value>, Error>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let consents = state
    .store
    .recent_consents(STATS_WINDOW)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;
  let stats = ConsentStats::from_records(&consents);
  Ok(Json(json!({ "stats": stats, "consents": consents })))
}

// ─── Preferences ──────────────────────────────────────────────────────────────

/// `GET /consent/preferences`
pub async fn read_preferences<S>(
  State(state): State<AppState<S>>,
  jar: CookieJar,
) -> Json<serde_json::Value>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let prefs = state.delivery.consent.read_preferences(&jar);
  Json(json!({ "decided": prefs.is_some(), "preferences": prefs }))
}

/// `POST /consent/preferences`
pub async fn write_preferences<S>(
  _: WithinLimit,
  State(state): State<AppState<S>>,
  jar: CookieJar,
  client: ClientMeta,
  Json(prefs): Json<ConsentPreferences>,
) -> Result<Response, Error>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let session = Session::resume_or_mint(&jar);
  let write = state
    .delivery
    .consent
    .write_preferences(&jar, session.id, &client, prefs)?;

  let body = json!({ "preferences": write.preferences, "enabled": write.enabled });
  let cookies = std::iter::once(write.cookie).chain(session.set_cookie()?);
  Ok(with_cookies(Json(body), cookies))
}
