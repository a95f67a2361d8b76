//! SQL schema for the Hoarding SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ad_slots (
    slot_id     TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    position    TEXT NOT NULL,   -- kebab-case Position
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ads (
    ad_id       TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    slot_id     TEXT REFERENCES ad_slots(slot_id),
    position    TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    code        TEXT,
    image_url   TEXT,
    link_url    TEXT,
    title       TEXT,
    description TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Append-only except for the single clicked 0 -> 1 transition.
CREATE TABLE IF NOT EXISTS ad_impressions (
    impression_id TEXT PRIMARY KEY,
    ad_id         TEXT NOT NULL REFERENCES ads(ad_id),
    ad_slot_id    TEXT REFERENCES ad_slots(slot_id),
    session_id    TEXT NOT NULL,
    ip_hash       TEXT NOT NULL,
    user_agent    TEXT NOT NULL,
    clicked       INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL   -- fixed-width RFC 3339, sorts lexically
);

CREATE TRIGGER IF NOT EXISTS ad_impressions_click_once
BEFORE UPDATE ON ad_impressions
WHEN OLD.clicked = 1
  OR NEW.clicked != 1
  OR NEW.ad_id      IS NOT OLD.ad_id
  OR NEW.session_id IS NOT OLD.session_id
  OR NEW.created_at IS NOT OLD.created_at
BEGIN
    SELECT RAISE(ABORT, 'impressions only transition clicked 0 -> 1');
END;

-- Strictly append-only.
CREATE TABLE IF NOT EXISTS cookie_consents (
    record_id   TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL,
    ip_hash     TEXT NOT NULL,
    user_agent  TEXT NOT NULL,
    consent     TEXT NOT NULL,   -- JSON ConsentPreferences
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cookie_settings (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    banner_text TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ad_slots_position_idx ON ad_slots(position, is_active);
CREATE INDEX IF NOT EXISTS ads_slot_idx          ON ads(slot_id, active);
CREATE INDEX IF NOT EXISTS impressions_click_idx
    ON ad_impressions(ad_id, session_id, clicked, created_at);
CREATE INDEX IF NOT EXISTS consents_created_idx  ON cookie_consents(created_at);

PRAGMA user_version = 1;
";
