//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so lexical order equals chronological order.
//! Consent preferences are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use hoarding_core::{
  ad::{Ad, AdPayload, AdSlot, Position},
  consent::{ConsentPreferences, ConsentRecord},
  impression::Impression,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// The current time at the precision [`encode_dt`] keeps, so a value built
/// from it equals the value read back.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Position ─────────────────────────────────────────────────────────────────

pub fn encode_position(p: Position) -> &'static str { p.into() }

pub fn decode_position(s: &str) -> Result<Position> { Ok(Position::parse(s)?) }

// ─── ConsentPreferences ───────────────────────────────────────────────────────

pub fn encode_consent(c: &ConsentPreferences) -> Result<String> {
  Ok(serde_json::to_string(c)?)
}

pub fn decode_consent(s: &str) -> Result<ConsentPreferences> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `ad_slots` row.
pub struct RawSlot {
  pub slot_id:    String,
  pub name:       String,
  pub position:   String,
  pub is_active:  bool,
  pub created_at: String,
}

impl RawSlot {
  pub const COLUMNS: &'static str = "slot_id, name, position, is_active, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      slot_id:    row.get(0)?,
      name:       row.get(1)?,
      position:   row.get(2)?,
      is_active:  row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_slot(self) -> Result<AdSlot> {
    Ok(AdSlot {
      id:         decode_uuid(&self.slot_id)?,
      name:       self.name,
      position:   decode_position(&self.position)?,
      is_active:  self.is_active,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `ads` row.
pub struct RawAd {
  pub ad_id:       String,
  pub name:        String,
  pub slot_id:     Option<String>,
  pub position:    String,
  pub active:      bool,
  pub code:        Option<String>,
  pub image_url:   Option<String>,
  pub link_url:    Option<String>,
  pub title:       Option<String>,
  pub description: Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawAd {
  pub const COLUMNS: &'static str = "ad_id, name, slot_id, position, active, code, \
     image_url, link_url, title, description, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ad_id:       row.get(0)?,
      name:        row.get(1)?,
      slot_id:     row.get(2)?,
      position:    row.get(3)?,
      active:      row.get(4)?,
      code:        row.get(5)?,
      image_url:   row.get(6)?,
      link_url:    row.get(7)?,
      title:       row.get(8)?,
      description: row.get(9)?,
      created_at:  row.get(10)?,
      updated_at:  row.get(11)?,
    })
  }

  pub fn into_ad(self) -> Result<Ad> {
    Ok(Ad {
      id:         decode_uuid(&self.ad_id)?,
      name:       self.name,
      slot_id:    self.slot_id.as_deref().map(decode_uuid).transpose()?,
      position:   decode_position(&self.position)?,
      active:     self.active,
      payload:    AdPayload {
        code:        self.code,
        image_url:   self.image_url,
        link_url:    self.link_url,
        title:       self.title,
        description: self.description,
      },
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from an `ad_impressions` row.
pub struct RawImpression {
  pub impression_id: String,
  pub ad_id:         String,
  pub ad_slot_id:    Option<String>,
  pub session_id:    String,
  pub ip_hash:       String,
  pub user_agent:    String,
  pub clicked:       bool,
  pub created_at:    String,
}

impl RawImpression {
  pub const COLUMNS: &'static str = "impression_id, ad_id, ad_slot_id, session_id, \
     ip_hash, user_agent, clicked, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      impression_id: row.get(0)?,
      ad_id:         row.get(1)?,
      ad_slot_id:    row.get(2)?,
      session_id:    row.get(3)?,
      ip_hash:       row.get(4)?,
      user_agent:    row.get(5)?,
      clicked:       row.get(6)?,
      created_at:    row.get(7)?,
    })
  }

  pub fn into_impression(self) -> Result<Impression> {
    Ok(Impression {
      id:         decode_uuid(&self.impression_id)?,
      ad_id:      decode_uuid(&self.ad_id)?,
      ad_slot_id: self.ad_slot_id.as_deref().map(decode_uuid).transpose()?,
      session_id: decode_uuid(&self.session_id)?,
      ip_hash:    self.ip_hash,
      user_agent: self.user_agent,
      clicked:    self.clicked,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `cookie_consents` row.
pub struct RawConsent {
  pub record_id:  String,
  pub session_id: String,
  pub ip_hash:    String,
  pub user_agent: String,
  pub consent:    String,
  pub created_at: String,
}

impl RawConsent {
  pub fn into_record(self) -> Result<ConsentRecord> {
    Ok(ConsentRecord {
      record_id:  decode_uuid(&self.record_id)?,
      session_id: decode_uuid(&self.session_id)?,
      ip_hash:    self.ip_hash,
      user_agent: self.user_agent,
      consent:    decode_consent(&self.consent)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let earlier = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let later = Utc.timestamp_opt(1_700_000_000, 1_000).unwrap();
    let (a, b) = (encode_dt(earlier), encode_dt(later));
    assert_eq!(a.len(), b.len());
    assert!(a < b, "{a} should sort before {b}");
    assert_eq!(decode_dt(&b).unwrap(), later);
  }

  #[test]
  fn now_survives_encoding() {
    let t = now();
    assert_eq!(decode_dt(&encode_dt(t)).unwrap(), t);
  }
}
