//! Placements, slots and ads.
//!
//! A slot binds a placement on the page to an on/off switch. An ad belongs to
//! at most one slot and carries its own rendering payload. Both are owned by
//! the admin backend; this pipeline only reads them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::Error;

// ─── Position ────────────────────────────────────────────────────────────────

/// A named location on a page where one ad may appear.
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
  IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Position {
  Header,
  Sidebar,
  Footer,
  InArticle,
  Hero,
  Inline,
}

impl Position {
  /// Parse a wire name (`"in-article"`, `"sidebar"`, …).
  pub fn parse(s: &str) -> crate::Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownPosition(s.to_owned()))
  }
}

// ─── Slot ────────────────────────────────────────────────────────────────────

/// The configuration record for a placement, independent of which ad fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSlot {
  pub id:         Uuid,
  pub name:       String,
  pub position:   Position,
  pub is_active:  bool,
  pub created_at: DateTime<Utc>,
}

/// Input for creating a slot. The store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewSlot {
  pub name:      String,
  pub position:  Position,
  pub is_active: bool,
}

impl NewSlot {
  pub fn active(name: impl Into<String>, position: Position) -> Self {
    Self { name: name.into(), position, is_active: true }
  }
}

// ─── Ad ──────────────────────────────────────────────────────────────────────

/// What the page renders for an ad: raw embed code, or an image/link/text
/// creative. Every field is optional; the renderer picks what is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPayload {
  pub code:        Option<String>,
  pub image_url:   Option<String>,
  pub link_url:    Option<String>,
  pub title:       Option<String>,
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ad {
  pub id:         Uuid,
  pub name:       String,
  pub slot_id:    Option<Uuid>,
  /// Mirrors the slot's position for direct lookup.
  pub position:   Position,
  pub active:     bool,
  #[serde(flatten)]
  pub payload:    AdPayload,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input for creating an ad. The store assigns `id` and both timestamps.
#[derive(Debug, Clone)]
pub struct NewAd {
  pub name:     String,
  pub slot_id:  Option<Uuid>,
  pub position: Position,
  pub active:   bool,
  pub payload:  AdPayload,
}

impl NewAd {
  /// An active ad filling `slot`.
  pub fn for_slot(name: impl Into<String>, slot: &AdSlot, payload: AdPayload) -> Self {
    Self {
      name: name.into(),
      slot_id: Some(slot.id),
      position: slot.position,
      active: true,
      payload,
    }
  }
}

/// A resolved placement: the active slot and the active ad filling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
  pub slot: AdSlot,
  pub ad:   Ad,
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn position_names_are_kebab_case() {
    assert_eq!(Position::InArticle.as_ref(), "in-article");
    assert_eq!(Position::parse("sidebar").unwrap(), Position::Sidebar);
    assert_eq!(
      serde_json::to_string(&Position::InArticle).unwrap(),
      "\"in-article\""
    );
  }

  #[test]
  fn every_position_parses_its_own_name() {
    for p in Position::iter() {
      assert_eq!(Position::parse(p.as_ref()).unwrap(), p);
    }
  }

  #[test]
  fn unknown_position_is_rejected() {
    assert!(matches!(
      Position::parse("skyscraper"),
      Err(Error::UnknownPosition(s)) if s == "skyscraper"
    ));
  }
}
