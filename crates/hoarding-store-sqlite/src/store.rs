//! [`SqliteStore`], the SQLite implementation of [`AdStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use hoarding_core::{
  ad::{Ad, AdSlot, NewAd, NewSlot, Position},
  consent::{ConsentRecord, NewConsentRecord},
  impression::{Impression, ImpressionStats, NewImpression},
  store::AdStore,
};

use crate::{
  encode::{
    self, encode_consent, encode_dt, encode_position, encode_uuid, RawAd, RawConsent,
    RawImpression, RawSlot,
  },
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An ad store backed by a single SQLite file.
///
/// Clones share the inner connection. All statements run on the
/// connection's single worker thread, in submission order.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── AdStore impl ────────────────────────────────────────────────────────────

impl AdStore for SqliteStore {
  type Error = crate::Error;

  // ── Slots & ads ───────────────────────────────────────────────────────────

  async fn insert_slot(&self, input: NewSlot) -> Result<AdSlot> {
    let slot = AdSlot {
      id:         Uuid::new_v4(),
      name:       input.name,
      position:   input.position,
      is_active:  input.is_active,
      created_at: encode::now(),
    };

    let id_str   = encode_uuid(slot.id);
    let name     = slot.name.clone();
    let position = encode_position(slot.position);
    let active   = slot.is_active;
    let at_str   = encode_dt(slot.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ad_slots (slot_id, name, position, is_active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, name, position, active, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(slot)
  }

  async fn find_active_slot(&self, position: Position) -> Result<Option<AdSlot>> {
    let position = encode_position(position);

    let raw: Option<RawSlot> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM ad_slots
           WHERE position = ?1 AND is_active = 1
           ORDER BY created_at, rowid
           LIMIT 1",
          RawSlot::COLUMNS
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![position], RawSlot::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSlot::into_slot).transpose()
  }

  async fn insert_ad(&self, input: NewAd) -> Result<Ad> {
    let now = encode::now();
    let ad = Ad {
      id:         Uuid::new_v4(),
      name:       input.name,
      slot_id:    input.slot_id,
      position:   input.position,
      active:     input.active,
      payload:    input.payload,
      created_at: now,
      updated_at: now,
    };

    let id_str   = encode_uuid(ad.id);
    let name     = ad.name.clone();
    let slot_str = ad.slot_id.map(encode_uuid);
    let position = encode_position(ad.position);
    let active   = ad.active;
    let payload  = ad.payload.clone();
    let at_str   = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ads (
             ad_id, name, slot_id, position, active,
             code, image_url, link_url, title, description,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
          rusqlite::params![
            id_str,
            name,
            slot_str,
            position,
            active,
            payload.code,
            payload.image_url,
            payload.link_url,
            payload.title,
            payload.description,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(ad)
  }

  async fn find_active_ad(&self, slot_id: Uuid) -> Result<Option<Ad>> {
    let slot_str = encode_uuid(slot_id);

    let raw: Option<RawAd> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM ads
           WHERE slot_id = ?1 AND active = 1
           ORDER BY created_at, rowid
           LIMIT 1",
          RawAd::COLUMNS
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![slot_str], RawAd::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAd::into_ad).transpose()
  }

  async fn set_ad_active(&self, ad_id: Uuid, active: bool) -> Result<bool> {
    let id_str = encode_uuid(ad_id);
    let at_str = encode_dt(encode::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE ads SET active = ?2, updated_at = ?3 WHERE ad_id = ?1",
          rusqlite::params![id_str, active, at_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Impressions ───────────────────────────────────────────────────────────

  async fn insert_impression(&self, input: NewImpression) -> Result<Impression> {
    let impression = Impression {
      id:         Uuid::new_v4(),
      ad_id:      input.ad_id,
      ad_slot_id: input.ad_slot_id,
      session_id: input.session_id,
      ip_hash:    input.ip_hash,
      user_agent: input.user_agent,
      clicked:    false,
      created_at: encode::now(),
    };

    let id_str      = encode_uuid(impression.id);
    let ad_str      = encode_uuid(impression.ad_id);
    let slot_str    = impression.ad_slot_id.map(encode_uuid);
    let session_str = encode_uuid(impression.session_id);
    let ip_hash     = impression.ip_hash.clone();
    let user_agent  = impression.user_agent.clone();
    let at_str      = encode_dt(impression.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ad_impressions (
             impression_id, ad_id, ad_slot_id, session_id,
             ip_hash, user_agent, clicked, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
          rusqlite::params![
            id_str,
            ad_str,
            slot_str,
            session_str,
            ip_hash,
            user_agent,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(impression)
  }

  async fn get_impression(&self, id: Uuid) -> Result<Option<Impression>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawImpression> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM ad_impressions WHERE impression_id = ?1",
          RawImpression::COLUMNS
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawImpression::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawImpression::into_impression).transpose()
  }

  async fn mark_latest_clicked(
    &self,
    ad_id:      Uuid,
    session_id: Uuid,
  ) -> Result<Option<Uuid>> {
    let ad_str      = encode_uuid(ad_id);
    let session_str = encode_uuid(session_id);

    // One statement: the candidate is chosen and claimed under the same write
    // lock, and `clicked = 0` is re-checked on the row being updated.
    let claimed: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "UPDATE ad_impressions SET clicked = 1
               WHERE clicked = 0
                 AND impression_id = (
                   SELECT impression_id FROM ad_impressions
                   WHERE ad_id = ?1 AND session_id = ?2 AND clicked = 0
                   ORDER BY created_at DESC, rowid DESC
                   LIMIT 1
                 )
               RETURNING impression_id",
              rusqlite::params![ad_str, session_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    claimed.map(|s| encode::decode_uuid(&s)).transpose()
  }

  async fn impression_stats(&self) -> Result<ImpressionStats> {
    let (impressions, clicks, active_slots): (i64, i64, i64) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM ad_impressions),
             (SELECT COUNT(*) FROM ad_impressions WHERE clicked = 1),
             (SELECT COUNT(*) FROM ad_slots WHERE is_active = 1)",
          [],
          |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?)
      })
      .await?;

    Ok(ImpressionStats {
      impressions:  impressions as u64,
      clicks:       clicks as u64,
      active_slots: active_slots as u64,
    })
  }

  // ── Consent log ───────────────────────────────────────────────────────────

  async fn append_consent(&self, input: NewConsentRecord) -> Result<ConsentRecord> {
    let record = ConsentRecord {
      record_id:  Uuid::new_v4(),
      session_id: input.session_id,
      ip_hash:    input.ip_hash,
      user_agent: input.user_agent,
      consent:    input.consent,
      created_at: encode::now(),
    };

    let id_str      = encode_uuid(record.record_id);
    let session_str = encode_uuid(record.session_id);
    let ip_hash     = record.ip_hash.clone();
    let user_agent  = record.user_agent.clone();
    let consent     = encode_consent(&record.consent)?;
    let at_str      = encode_dt(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cookie_consents (
             record_id, session_id, ip_hash, user_agent, consent, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, session_str, ip_hash, user_agent, consent, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn recent_consents(&self, limit: usize) -> Result<Vec<ConsentRecord>> {
    let limit_val = limit as i64;

    let raws: Vec<RawConsent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT record_id, session_id, ip_hash, user_agent, consent, created_at
           FROM cookie_consents
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |row| {
            Ok(RawConsent {
              record_id:  row.get(0)?,
              session_id: row.get(1)?,
              ip_hash:    row.get(2)?,
              user_agent: row.get(3)?,
              consent:    row.get(4)?,
              created_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConsent::into_record).collect()
  }

  // ── Banner settings ───────────────────────────────────────────────────────

  async fn banner_text(&self) -> Result<Option<String>> {
    Ok(
      self
        .conn
        .call(|conn| {
          Ok(
            conn
              .query_row(
                "SELECT banner_text FROM cookie_settings WHERE id = 1",
                [],
                |r| r.get(0),
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn set_banner_text(&self, text: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cookie_settings (id, banner_text) VALUES (1, ?1)
           ON CONFLICT(id) DO UPDATE SET banner_text = excluded.banner_text",
          rusqlite::params![text],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
