//! Consent preferences and the append-only consent log.
//!
//! The `necessary` category cannot be switched off: it is not a public field,
//! every constructor and the deserialiser force it to `true`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator as _};
use uuid::Uuid;

// ─── Categories ──────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConsentCategory {
  Necessary,
  Analytics,
  Advertising,
  Personalization,
}

// ─── Preferences ─────────────────────────────────────────────────────────────

/// A client's cookie choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePreferences")]
pub struct ConsentPreferences {
  necessary:           bool,
  pub analytics:       bool,
  pub advertising:     bool,
  pub personalization: bool,
}

/// The shape accepted from clients. A `necessary` key is ignored.
#[derive(Deserialize)]
struct WirePreferences {
  #[serde(default)]
  analytics:       bool,
  #[serde(default)]
  advertising:     bool,
  #[serde(default)]
  personalization: bool,
}

impl From<WirePreferences> for ConsentPreferences {
  fn from(w: WirePreferences) -> Self {
    Self::new(w.analytics, w.advertising, w.personalization)
  }
}

impl ConsentPreferences {
  pub fn new(analytics: bool, advertising: bool, personalization: bool) -> Self {
    Self { necessary: true, analytics, advertising, personalization }
  }

  /// "Accept all" on the banner.
  pub fn accept_all() -> Self { Self::new(true, true, true) }

  /// "Decline all" on the banner: only necessary cookies.
  pub fn necessary_only() -> Self { Self::new(false, false, false) }

  pub fn necessary(&self) -> bool { self.necessary }

  pub fn allows(&self, category: ConsentCategory) -> bool {
    match category {
      ConsentCategory::Necessary => true,
      ConsentCategory::Analytics => self.analytics,
      ConsentCategory::Advertising => self.advertising,
      ConsentCategory::Personalization => self.personalization,
    }
  }

  pub fn is_all_accepted(&self) -> bool {
    self.analytics && self.advertising && self.personalization
  }

  pub fn is_only_necessary(&self) -> bool {
    !self.analytics && !self.advertising && !self.personalization
  }

  /// Optional categories that are on in `self` but were off (or undecided)
  /// in `previous`.
  pub fn enabled_since(&self, previous: Option<&Self>) -> Vec<ConsentCategory> {
    ConsentCategory::iter()
      .filter(|&c| c != ConsentCategory::Necessary)
      .filter(|&c| self.allows(c) && !previous.is_some_and(|p| p.allows(c)))
      .collect()
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One entry in the consent log. Never updated; a change appends a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
  pub record_id:  Uuid,
  pub session_id: Uuid,
  pub ip_hash:    String,
  pub user_agent: String,
  pub consent:    ConsentPreferences,
  pub created_at: DateTime<Utc>,
}

/// Input for [`crate::store::AdStore::append_consent`].
#[derive(Debug, Clone)]
pub struct NewConsentRecord {
  pub session_id: Uuid,
  pub ip_hash:    String,
  pub user_agent: String,
  pub consent:    ConsentPreferences,
}

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Aggregate counts over a batch of consent records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStats {
  pub total:           u64,
  pub analytics:       u64,
  pub advertising:     u64,
  pub personalization: u64,
  pub all_accepted:    u64,
  pub only_necessary:  u64,
  /// Some but not all optional categories accepted.
  pub custom:          u64,
}

impl ConsentStats {
  pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ConsentRecord>) -> Self {
    records.into_iter().fold(Self::default(), |mut s, r| {
      let c = &r.consent;
      s.total += 1;
      s.analytics += u64::from(c.analytics);
      s.advertising += u64::from(c.advertising);
      s.personalization += u64::from(c.personalization);
      if c.is_all_accepted() {
        s.all_accepted += 1;
      } else if c.is_only_necessary() {
        s.only_necessary += 1;
      } else {
        s.custom += 1;
      }
      s
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn necessary_cannot_be_declined_over_the_wire() {
    let prefs: ConsentPreferences = serde_json::from_str(
      r#"{"necessary":false,"analytics":true,"advertising":false,"personalization":false}"#,
    )
    .unwrap();
    assert!(prefs.necessary());
    assert!(prefs.allows(ConsentCategory::Necessary));
    assert!(prefs.analytics);

    let json = serde_json::to_value(prefs).unwrap();
    assert_eq!(json["necessary"], true);
  }

  #[test]
  fn missing_categories_default_to_declined() {
    let prefs: ConsentPreferences = serde_json::from_str("{}").unwrap();
    assert_eq!(prefs, ConsentPreferences::necessary_only());
  }

  #[test]
  fn enabled_since_reports_only_new_grants() {
    let before = ConsentPreferences::new(true, false, false);
    let after = ConsentPreferences::new(true, true, false);
    assert_eq!(after.enabled_since(Some(&before)), vec![ConsentCategory::Advertising]);
    assert_eq!(
      after.enabled_since(None),
      vec![ConsentCategory::Analytics, ConsentCategory::Advertising]
    );
    assert!(before.enabled_since(Some(&after)).is_empty());
  }

  fn record(consent: ConsentPreferences) -> ConsentRecord {
    ConsentRecord {
      record_id: Uuid::new_v4(),
      session_id: Uuid::new_v4(),
      ip_hash: String::new(),
      user_agent: String::new(),
      consent,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn stats_partition_records() {
    let records = vec![
      record(ConsentPreferences::accept_all()),
      record(ConsentPreferences::accept_all()),
      record(ConsentPreferences::necessary_only()),
      record(ConsentPreferences::new(true, false, false)),
    ];
    let stats = ConsentStats::from_records(&records);
    assert_eq!(stats, ConsentStats {
      total:           4,
      analytics:       3,
      advertising:     2,
      personalization: 2,
      all_accepted:    2,
      only_necessary:  1,
      custom:          1,
    });
  }
}
