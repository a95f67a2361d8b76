//! `GET /cookie-settings`: the consent banner copy.

use axum::{Json, extract::State};
use hoarding_core::store::AdStore;
use serde_json::json;

use crate::AppState;

pub const DEFAULT_BANNER_TEXT: &str = "We use cookies to enhance your experience and analyze \
  site traffic. By continuing to visit this site you agree to our use of cookies.";

/// Falls back to [`DEFAULT_BANNER_TEXT`] when none is stored or the store
/// is unreachable.
pub async fn cookie_settings<S>(State(state): State<AppState<S>>) -> Json<serde_json::Value>
where
  S: AdStore + Clone + Send + Sync + 'static,
{
  let text = match state.store.banner_text().await {
    Ok(Some(text)) => text,
    Ok(None) => DEFAULT_BANNER_TEXT.to_owned(),
    Err(e) => {
      tracing::warn!(error = %e, "failed to read banner text");
      DEFAULT_BANNER_TEXT.to_owned()
    }
  };
  Json(json!({ "banner_text": text }))
}
