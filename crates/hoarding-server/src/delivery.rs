//! Consent-gated ad delivery, beacons and click reports.
//!
//! A served ad is counted once. `GET /ads` records the impression itself, so
//! the page's follow-up beacon for the same session and ad is absorbed
//! within [`SERVED_WINDOW`]. A beacon with no matching delivery is recorded.

use std::{sync::Arc, time::Duration};

use hoarding_core::{
  ad::{Placement, Position},
  consent::ConsentCategory,
  impression::Impression,
  store::AdStore,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
  cache::TtlCache,
  client::ClientMeta,
  consent::ConsentStore,
  cookies::CookieJar,
  error::Error,
  resolver::AdResolver,
  session::Session,
  tracker::{ClickOutcome, ImpressionTracker},
};

/// What [`AdDelivery::deliver`] decided for one request.
#[derive(Debug, Default)]
pub struct Delivery {
  pub placement: Option<Placement>,
  /// Present only when advertising consent was given.
  pub session:   Option<Session>,
  /// The impression write, when an ad was served.
  pub tracking:  Option<JoinHandle<()>>,
}

/// How long a delivery absorbs the beacon for the same (session, ad).
pub const SERVED_WINDOW: Duration = Duration::from_secs(60);

/// Deliveries whose impression is already recorded, keyed by (session, ad).
pub type ServedLog = TtlCache<(Uuid, Uuid), ()>;

/// What [`AdDelivery::record_beacon`] did with a beacon.
#[derive(Debug)]
pub enum Beacon {
  Recorded(Impression),
  /// The delivery that served this ad already counted the view.
  CountedOnDelivery,
}

pub struct AdDelivery<S> {
  pub resolver: AdResolver<S>,
  pub tracker:  ImpressionTracker<S>,
  pub consent:  ConsentStore<S>,
  pub served:   Arc<ServedLog>,
}

impl<S> AdDelivery<S>
where
  S: AdStore + 'static,
{
  pub fn new(
    resolver: AdResolver<S>,
    tracker:  ImpressionTracker<S>,
    consent:  ConsentStore<S>,
  ) -> Self {
    Self { resolver, tracker, consent, served: Arc::new(TtlCache::new(SERVED_WINDOW)) }
  }

  fn advertising_allowed(&self, jar: &CookieJar) -> bool {
    self.consent.has_consent(jar, ConsentCategory::Advertising)
  }

  /// Pick the ad for `position` and record an impression in the background.
  ///
  /// Without advertising consent nothing is looked up, recorded or minted.
  pub async fn deliver(
    &self,
    position: Position,
    jar:      &CookieJar,
    client:   &ClientMeta,
  ) -> Delivery {
    if !self.advertising_allowed(jar) {
      return Delivery::default();
    }

    let session = Session::resume_or_mint(jar);
    let Some(placement) = self.resolver.resolve(position).await else {
      return Delivery { placement: None, session: Some(session), tracking: None };
    };

    self.served.set((session.id, placement.ad.id), (), None);
    let tracking = {
      let tracker = self.tracker.clone();
      let ad_id = placement.ad.id;
      let slot_id = placement.slot.id;
      let client = client.clone();
      tokio::spawn(async move {
        // Logged inside `record_impression`.
        let _ = tracker
          .record_impression(ad_id, Some(slot_id), session.id, &client.addr, &client.user_agent)
          .await;
      })
    };

    Delivery { placement: Some(placement), session: Some(session), tracking: Some(tracking) }
  }

  /// Record an impression reported by the page. `Ok(None)` when the client
  /// has not consented to advertising.
  pub async fn record_beacon(
    &self,
    ad_id:    Uuid,
    position: Option<Position>,
    jar:      &CookieJar,
    client:   &ClientMeta,
  ) -> Result<Option<(Beacon, Session)>, Error> {
    if !self.advertising_allowed(jar) {
      return Ok(None);
    }

    let session = Session::resume_or_mint(jar);
    if self.served.take(&(session.id, ad_id)).is_some() {
      tracing::debug!(%ad_id, "beacon already counted on delivery");
      return Ok(Some((Beacon::CountedOnDelivery, session)));
    }

    let slot_id = match position {
      Some(p) => match self.resolver.slot_for(p).await {
        Ok(slot) => slot.map(|s| s.id),
        Err(e) => {
          tracing::warn!(position = %p, error = %e, "slot lookup failed; recording without slot");
          None
        }
      },
      None => None,
    };

    let impression = self
      .tracker
      .record_impression(ad_id, slot_id, session.id, &client.addr, &client.user_agent)
      .await?;
    Ok(Some((Beacon::Recorded(impression), session)))
  }

  /// Attribute a click for the requesting session.
  pub async fn report_click(&self, ad_id: Uuid, jar: &CookieJar) -> Result<ClickOutcome, Error> {
    let session_id = Session::existing(jar)
      .ok_or_else(|| Error::BadRequest("session not found".into()))?;
    Ok(self.tracker.record_click(ad_id, session_id).await?)
  }
}
