//! Reading and writing a client's consent choices.
//!
//! The `cookie_consent` cookie is the source of truth for gating; the
//! database log is an audit trail written after the fact.

use std::{sync::Arc, time::Duration};

use axum::http::HeaderValue;
use hoarding_core::{
  consent::{ConsentCategory, ConsentPreferences, ConsentRecord, NewConsentRecord},
  store::AdStore,
};
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use crate::{
  client::ClientMeta,
  cookies::{CookieJar, SetCookie, percent_decode, percent_encode},
  error::{Error, TrackingError},
  privacy::IpHasher,
};

pub const CONSENT_COOKIE: &str = "cookie_consent";

/// One year.
pub const CONSENT_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Broadcast when a category is switched on for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentSignal {
  pub session_id: Uuid,
  pub category:   ConsentCategory,
}

/// The result of [`ConsentStore::write_preferences`].
#[derive(Debug)]
pub struct ConsentWrite {
  pub preferences: ConsentPreferences,
  /// `Set-Cookie` for [`CONSENT_COOKIE`].
  pub cookie:      HeaderValue,
  /// Categories that were off before this write and are now on.
  pub enabled:     Vec<ConsentCategory>,
  /// The background append to the consent log.
  pub persisted:   JoinHandle<()>,
}

pub struct ConsentStore<S> {
  store:   Arc<S>,
  hasher:  IpHasher,
  signals: broadcast::Sender<ConsentSignal>,
}

impl<S> Clone for ConsentStore<S> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      hasher:  self.hasher.clone(),
      signals: self.signals.clone(),
    }
  }
}

impl<S> ConsentStore<S>
where
  S: AdStore + 'static,
{
  pub fn new(store: Arc<S>, hasher: IpHasher) -> Self {
    let (signals, _) = broadcast::channel(64);
    Self { store, hasher, signals }
  }

  /// Receive a [`ConsentSignal`] for every category enabled from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<ConsentSignal> { self.signals.subscribe() }

  /// The preferences stored in the request's consent cookie. A missing,
  /// undecodable or malformed cookie means the client has not decided.
  pub fn read_preferences(&self, jar: &CookieJar) -> Option<ConsentPreferences> {
    let raw = jar.get(CONSENT_COOKIE)?;
    let decoded = percent_decode(raw)?;
    match serde_json::from_str(&decoded) {
      Ok(prefs) => Some(prefs),
      Err(e) => {
        tracing::debug!(error = %e, "ignoring malformed consent cookie");
        None
      }
    }
  }

  /// `necessary` is always granted; every other category needs an explicit
  /// opt-in.
  pub fn has_consent(&self, jar: &CookieJar, category: ConsentCategory) -> bool {
    if category == ConsentCategory::Necessary {
      return true;
    }
    self.read_preferences(jar).is_some_and(|p| p.allows(category))
  }

  /// Build the consent cookie for `prefs`, append a log record in the
  /// background, and signal every newly enabled category.
  ///
  /// The cookie is readable by page scripts so the banner can reflect the
  /// stored choice.
  pub fn write_preferences(
    &self,
    jar:        &CookieJar,
    session_id: Uuid,
    client:     &ClientMeta,
    prefs:      ConsentPreferences,
  ) -> Result<ConsentWrite, Error> {
    let previous = self.read_preferences(jar);

    let json = serde_json::to_string(&prefs)
      .map_err(|e| Error::BadRequest(format!("unserialisable preferences: {e}")))?;
    let encoded = percent_encode(&json);
    let cookie = SetCookie {
      name:      CONSENT_COOKIE,
      value:     &encoded,
      max_age:   CONSENT_MAX_AGE,
      http_only: false,
    }
    .to_header_value()?;

    let persisted = {
      let this = self.clone();
      let client = client.clone();
      tokio::spawn(async move {
        // Logged inside `record`.
        let _ = this.record(session_id, &client, prefs).await;
      })
    };

    let enabled = prefs.enabled_since(previous.as_ref());
    for &category in &enabled {
      // No subscribers is not an error.
      let _ = self.signals.send(ConsentSignal { session_id, category });
    }

    Ok(ConsentWrite { preferences: prefs, cookie, enabled, persisted })
  }

  /// Append one record to the consent log. The raw address is hashed first.
  pub async fn record(
    &self,
    session_id: Uuid,
    client:     &ClientMeta,
    prefs:      ConsentPreferences,
  ) -> Result<ConsentRecord, TrackingError> {
    let input = NewConsentRecord {
      session_id,
      ip_hash: self.hasher.hash(&client.addr),
      user_agent: client.user_agent.clone(),
      consent: prefs,
    };
    match self.store.append_consent(input).await {
      Ok(record) => {
        tracing::debug!(%session_id, record_id = %record.record_id, "consent recorded");
        Ok(record)
      }
      Err(e) => {
        tracing::warn!(%session_id, error = %e, "failed to record consent");
        Err(TrackingError::store(e))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use axum::http::{HeaderMap, header};
  use hoarding_store_sqlite::SqliteStore;

  use super::*;

  fn jar_with(cookie: &str) -> CookieJar {
    let mut h = HeaderMap::new();
    h.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
    CookieJar::from_headers(&h)
  }

  fn consent_cookie(prefs: ConsentPreferences) -> String {
    format!(
      "{CONSENT_COOKIE}={}",
      percent_encode(&serde_json::to_string(&prefs).unwrap())
    )
  }

  fn client() -> ClientMeta {
    ClientMeta { addr: "203.0.113.5".into(), user_agent: "test-agent".into() }
  }

  async fn consent_store() -> (Arc<SqliteStore>, ConsentStore<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    (store.clone(), ConsentStore::new(store, IpHasher::default()))
  }

  #[tokio::test]
  async fn undecided_client_has_only_necessary() {
    let (_, consent) = consent_store().await;
    let jar = CookieJar::default();
    assert_eq!(consent.read_preferences(&jar), None);
    assert!(consent.has_consent(&jar, ConsentCategory::Necessary));
    assert!(!consent.has_consent(&jar, ConsentCategory::Advertising));
  }

  #[tokio::test]
  async fn malformed_cookie_counts_as_undecided() {
    let (_, consent) = consent_store().await;
    for raw in ["cookie_consent=%7Bnope", "cookie_consent=%ZZ", "cookie_consent=42"] {
      let jar = jar_with(raw);
      assert_eq!(consent.read_preferences(&jar), None, "{raw}");
      assert!(!consent.has_consent(&jar, ConsentCategory::Advertising));
    }
  }

  #[tokio::test]
  async fn reads_granted_categories_from_cookie() {
    let (_, consent) = consent_store().await;
    let jar = jar_with(&consent_cookie(ConsentPreferences::new(false, true, false)));
    assert!(consent.has_consent(&jar, ConsentCategory::Advertising));
    assert!(!consent.has_consent(&jar, ConsentCategory::Analytics));
  }

  #[tokio::test]
  async fn write_sets_readable_cookie_and_persists() {
    let (store, consent) = consent_store().await;
    let session = Uuid::new_v4();
    let write = consent
      .write_preferences(&CookieJar::default(), session, &client(), ConsentPreferences::accept_all())
      .unwrap();

    let cookie = write.cookie.to_str().unwrap().to_owned();
    assert!(cookie.starts_with("cookie_consent=%7B"), "{cookie}");
    assert!(!cookie.contains("HttpOnly"), "{cookie}");

    let value = cookie.split(';').next().unwrap();
    let round_trip = consent.read_preferences(&jar_with(value));
    assert_eq!(round_trip, Some(ConsentPreferences::accept_all()));

    write.persisted.await.unwrap();
    let log = store.recent_consents(10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].session_id, session);
    assert_eq!(log[0].ip_hash, IpHasher::default().hash("203.0.113.5"));
    assert_eq!(log[0].user_agent, "test-agent");
  }

  #[tokio::test]
  async fn signals_only_newly_enabled_categories() {
    let (_, consent) = consent_store().await;
    let mut rx = consent.subscribe();
    let session = Uuid::new_v4();
    let jar = jar_with(&consent_cookie(ConsentPreferences::new(true, false, false)));

    let write = consent
      .write_preferences(&jar, session, &client(), ConsentPreferences::new(true, true, false))
      .unwrap();
    assert_eq!(write.enabled, vec![ConsentCategory::Advertising]);

    assert_eq!(rx.recv().await.unwrap(), ConsentSignal {
      session_id: session,
      category:   ConsentCategory::Advertising,
    });
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn every_change_appends_a_record() {
    let (store, consent) = consent_store().await;
    let session = Uuid::new_v4();
    for prefs in [ConsentPreferences::accept_all(), ConsentPreferences::necessary_only()] {
      consent.record(session, &client(), prefs).await.unwrap();
    }
    let log = store.recent_consents(10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].consent, ConsentPreferences::necessary_only());
  }
}
