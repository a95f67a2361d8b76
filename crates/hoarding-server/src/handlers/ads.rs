//! Handlers for `/ads` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/ads` | `?position=<position>`; `{ad, slot}` or `{ad: null}` |
//! | `POST` | `/ads/impression` | Body: `{"ad_id": …, "position": …}`; rate-limited |
//! | `POST` | `/ads/click` | Body: `{"ad_id": …}`; needs `session_id`; rate-limited |

use axum::{
  Json,
  extract::{Query, State},
  response::{IntoResponse, Response},
};
use hoarding_core::{ad::Position, store::AdStore};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::with_cookies;
use crate::{
  AppState, client::ClientMeta, cookies::CookieJar, error::Error, rate_limit::WithinLimit,
};

fn parse_position(raw: Option<&str>) -> Result<Position, Error> {
  let raw = raw
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| Error::BadRequest("position required".into()))?;
  Position::parse(raw).map_err(|e| Error::BadRequest(e.to_string()))
}

// ─── Deliver ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AdQuery {
  pub position: Option<String>,
}

/// `GET /ads?position=<position>`
pub async fn get_ad<S>(
  State(state): State<AppState<S>>,
  jar: CookieJar,
  client: ClientMeta,
  Query(query): Query<AdQuery>,
) -> Result<Response, Error>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let position = parse_position(query.position.as_deref())?;
  let delivery = state.delivery.deliver(position, &jar, &client).await;

  let body = match &delivery.placement {
    Some(p) => json!({ "ad": p.ad, "slot": p.slot }),
    None => json!({ "ad": null }),
  };
  let cookie = delivery.session.map(|s| s.set_cookie()).transpose()?.flatten();
  Ok(with_cookies(Json(body), cookie))
}

// ─── Impression beacon ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ImpressionBody {
  pub ad_id:    Option<Uuid>,
  #[serde(default)]
  pub position: Option<String>,
}

/// `POST /ads/impression`
pub async fn impression<S>(
  _: WithinLimit,
  State(state): State<AppState<S>>,
  jar: CookieJar,
  client: ClientMeta,
  Json(body): Json<ImpressionBody>,
) -> Result<Response, Error>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let ad_id = body.ad_id.ok_or_else(|| Error::BadRequest("ad_id required".into()))?;
  let position = match body.position.as_deref() {
    Some(raw) => Some(parse_position(Some(raw))?),
    None => None,
  };

  match state.delivery.record_beacon(ad_id, position, &jar, &client).await? {
    Some((_, session)) => {
      Ok(with_cookies(Json(json!({ "success": true })), session.set_cookie()?))
    }
    None => Ok(Json(json!({ "success": false })).into_response()),
  }
}

// ─── Click ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClickBody {
  pub ad_id: Option<Uuid>,
}

/// `POST /ads/click`
pub async fn click<S>(
  _: WithinLimit,
  State(state): State<AppState<S>>,
  jar: CookieJar,
  Json(body): Json<ClickBody>,
) -> Result<Json<serde_json::Value>, Error>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let ad_id = body.ad_id.ok_or_else(|| Error::BadRequest("ad_id required".into()))?;
  let outcome = state.delivery.report_click(ad_id, &jar).await?;
  Ok(Json(json!({ "success": true, "attributed": outcome.is_attributed() })))
}
