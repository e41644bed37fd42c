//! [`SqliteStore`]: the SQLite implementation of the Vigil storage traits.

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use vigil_core::{
  contact::{ChannelKind, Contact, ReachableAddresses, Tier, Address},
  incident::{
    ActiveIncident, Grant, GrantOutcome, Incident, IncidentStatus, InsertedIncident,
    NewIncident, PendingCheck,
  },
  store::{
    ContactDirectory, IncidentStore, LocationStore, NotificationLedger, SafetyCheckStore,
    Store,
  },
  subject::{GeoPoint, LocationSample, Subject},
};

use crate::{
  encode::{
    decode_uuid, encode_dt, encode_uuid, RawCheck, RawContact, RawGrant, RawIncident,
    RawSample, RawSubject,
  },
  schema::SCHEMA,
  Result,
};

// ─── Row mappers ─────────────────────────────────────────────────────────────

const INCIDENT_COLUMNS: &str = "incident_id, subject_id, status, trigger, last_known_lat, \
                                last_known_lng, created_at, source_check_id";

fn incident_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIncident> {
  Ok(RawIncident {
    incident_id:     row.get(0)?,
    subject_id:      row.get(1)?,
    status:          row.get(2)?,
    trigger:         row.get(3)?,
    last_known_lat:  row.get(4)?,
    last_known_lng:  row.get(5)?,
    created_at:      row.get(6)?,
    source_check_id: row.get(7)?,
  })
}

fn sample_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSample> {
  Ok(RawSample {
    sample_id:   row.get(0)?,
    lat:         row.get(1)?,
    lng:         row.get(2)?,
    recorded_at: row.get(3)?,
  })
}

// ─── Seeding input ───────────────────────────────────────────────────────────

/// Input for [`SqliteStore::add_contact`].
#[derive(Debug, Clone)]
pub struct NewContact {
  pub subject_id:   Uuid,
  pub recipient_id: Uuid,
  pub tier:         Tier,
  pub priority:     Option<i32>,
  pub always_share: bool,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vigil store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
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

  // ── Administrative writes ─────────────────────────────────────────────────
  //
  // Subjects, contacts, addresses, samples and checks are owned by other
  // parts of the product; these writes exist for provisioning and tests.

  /// Create a subject with the given display name.
  pub async fn add_subject(&self, display_name: &str) -> Result<Subject> {
    let subject = Subject {
      subject_id:   Uuid::new_v4(),
      display_name: display_name.to_owned(),
      last_known:   None,
    };

    let id_str   = encode_uuid(subject.subject_id);
    let name     = subject.display_name.clone();
    let at_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subjects (subject_id, display_name, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(subject)
  }

  /// Attach a contact to a subject at a tier.
  pub async fn add_contact(&self, input: NewContact) -> Result<Contact> {
    let contact = Contact {
      contact_id:   Uuid::new_v4(),
      subject_id:   input.subject_id,
      recipient_id: input.recipient_id,
      tier:         input.tier,
      priority:     input.priority,
      always_share: input.always_share,
      location:     None,
    };

    let contact_id_str   = encode_uuid(contact.contact_id);
    let subject_id_str   = encode_uuid(contact.subject_id);
    let recipient_id_str = encode_uuid(contact.recipient_id);
    let tier             = i64::from(contact.tier.get());
    let priority         = contact.priority;
    let always_share     = contact.always_share;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO contacts (
             contact_id, subject_id, recipient_id, tier, priority, always_share
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            contact_id_str,
            subject_id_str,
            recipient_id_str,
            tier,
            priority,
            always_share,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(contact)
  }

  /// Register a delivery address for a recipient. Duplicates are ignored.
  pub async fn add_address(
    &self,
    recipient_id: Uuid,
    channel:      ChannelKind,
    target:       &str,
  ) -> Result<()> {
    let recipient_id_str = encode_uuid(recipient_id);
    let channel_str      = channel.to_string();
    let target           = target.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO recipient_addresses (recipient_id, channel, target)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (recipient_id, channel, target) DO NOTHING",
          rusqlite::params![recipient_id_str, channel_str, target],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Append a location sample for any user (subject or recipient).
  pub async fn record_location(
    &self,
    user_id: Uuid,
    point:   GeoPoint,
    at:      DateTime<Utc>,
  ) -> Result<()> {
    let user_id_str = encode_uuid(user_id);
    let at_str      = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO location_samples (user_id, lat, lng, recorded_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![user_id_str, point.lat, point.lng, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Schedule a safety check for `subject_id` expiring at `expires_at`.
  pub async fn add_pending_check(
    &self,
    subject_id: Uuid,
    expires_at: DateTime<Utc>,
  ) -> Result<PendingCheck> {
    let check = PendingCheck {
      check_id: Uuid::new_v4(),
      subject_id,
      expires_at,
      responded_at: None,
    };

    let check_id_str   = encode_uuid(check.check_id);
    let subject_id_str = encode_uuid(subject_id);
    let expires_str    = encode_dt(expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO pending_safety_checks (check_id, subject_id, expires_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![check_id_str, subject_id_str, expires_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(check)
  }

  /// Fetch a single check regardless of its state.
  pub async fn get_check(&self, check_id: Uuid) -> Result<Option<PendingCheck>> {
    let id_str = encode_uuid(check_id);

    let raw: Option<RawCheck> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT check_id, subject_id, expires_at, responded_at
             FROM pending_safety_checks WHERE check_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawCheck {
                check_id:     row.get(0)?,
                subject_id:   row.get(1)?,
                expires_at:   row.get(2)?,
                responded_at: row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCheck::into_check).transpose()
  }
}

// ─── Trait impls ─────────────────────────────────────────────────────────────

impl Store for SqliteStore {
  type Error = crate::Error;
}

impl ContactDirectory for SqliteStore {
  async fn get_subject(&self, subject_id: Uuid) -> Result<Option<Subject>> {
    let id_str = encode_uuid(subject_id);

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT s.subject_id, s.display_name, l.lat, l.lng
             FROM subjects s
             LEFT JOIN location_samples l ON l.sample_id = (
               SELECT sample_id FROM location_samples
               WHERE user_id = s.subject_id
               ORDER BY recorded_at DESC, sample_id DESC
               LIMIT 1
             )
             WHERE s.subject_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawSubject {
                subject_id:   row.get(0)?,
                display_name: row.get(1)?,
                lat:          row.get(2)?,
                lng:          row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn tier_contacts(&self, subject_id: Uuid, tier: Tier) -> Result<Vec<Contact>> {
    let id_str = encode_uuid(subject_id);
    let tier   = i64::from(tier.get());

    let raws: Vec<RawContact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.contact_id, c.subject_id, c.recipient_id, c.tier,
                  c.priority, c.always_share, l.lat, l.lng
           FROM contacts c
           LEFT JOIN location_samples l ON l.sample_id = (
             SELECT sample_id FROM location_samples
             WHERE user_id = c.recipient_id
             ORDER BY recorded_at DESC, sample_id DESC
             LIMIT 1
           )
           WHERE c.subject_id = ?1 AND c.tier = ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, tier], |row| {
            Ok(RawContact {
              contact_id:   row.get(0)?,
              subject_id:   row.get(1)?,
              recipient_id: row.get(2)?,
              tier:         row.get(3)?,
              priority:     row.get(4)?,
              always_share: row.get(5)?,
              lat:          row.get(6)?,
              lng:          row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContact::into_contact).collect()
  }

  async fn reachable_addresses(&self, contact_id: Uuid) -> Result<ReachableAddresses> {
    let id_str = encode_uuid(contact_id);

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT a.channel, a.target
           FROM contacts c
           JOIN recipient_addresses a ON a.recipient_id = c.recipient_id
           WHERE c.contact_id = ?1
           ORDER BY a.rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut addresses = Vec::with_capacity(rows.len());
    for (channel, target) in rows {
      match ChannelKind::parse(&channel) {
        Ok(channel) => addresses.push(Address { channel, target }),
        // A channel this build does not know about is simply unreachable.
        Err(e) => tracing::debug!(%contact_id, error = %e, "skipping address"),
      }
    }
    Ok(ReachableAddresses::new(addresses))
  }
}

impl NotificationLedger for SqliteStore {
  async fn has_grant(&self, incident_id: Uuid, contact_id: Uuid) -> Result<bool> {
    let incident_str = encode_uuid(incident_id);
    let contact_str  = encode_uuid(contact_id);

    let exists = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM incident_grants WHERE incident_id = ?1 AND contact_id = ?2",
            rusqlite::params![incident_str, contact_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false))
      })
      .await?;
    Ok(exists)
  }

  async fn record_grant(
    &self,
    incident_id: Uuid,
    contact_id:  Uuid,
    tier:        Tier,
  ) -> Result<GrantOutcome> {
    let grant = Grant { incident_id, contact_id, tier, notified_at: Utc::now() };

    let incident_str = encode_uuid(incident_id);
    let contact_str  = encode_uuid(contact_id);
    let tier_val     = i64::from(tier.get());
    let at_str       = encode_dt(grant.notified_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO incident_grants (incident_id, contact_id, tier, notified_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (incident_id, contact_id) DO NOTHING",
          rusqlite::params![incident_str, contact_str, tier_val, at_str],
        )?)
      })
      .await?;

    Ok(if inserted == 1 { GrantOutcome::Created(grant) } else { GrantOutcome::AlreadyExists })
  }

  async fn list_notified_contacts(&self, incident_id: Uuid) -> Result<HashSet<Uuid>> {
    let id_str = encode_uuid(incident_id);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT contact_id FROM incident_grants WHERE incident_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn list_grants(&self, incident_id: Uuid) -> Result<Vec<Grant>> {
    let id_str = encode_uuid(incident_id);

    let raws: Vec<RawGrant> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT incident_id, contact_id, tier, notified_at
           FROM incident_grants WHERE incident_id = ?1
           ORDER BY notified_at, contact_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawGrant {
              incident_id: row.get(0)?,
              contact_id:  row.get(1)?,
              tier:        row.get(2)?,
              notified_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGrant::into_grant).collect()
  }
}

impl IncidentStore for SqliteStore {
  async fn insert_incident(&self, input: NewIncident) -> Result<InsertedIncident> {
    let incident_id_str = encode_uuid(Uuid::new_v4());
    let subject_id_str  = encode_uuid(input.subject_id);
    let trigger         = input.trigger.to_string();
    let lat             = input.last_known.map(|p| p.lat);
    let lng             = input.last_known.map(|p| p.lng);
    let at_str          = encode_dt(Utc::now());
    let check_str       = input.source_check_id.map(encode_uuid);
    let status          = IncidentStatus::Active.to_string();

    let (raw, inserted): (RawIncident, usize) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          "INSERT INTO incidents (
             incident_id, subject_id, status, trigger,
             last_known_lat, last_known_lng, created_at, source_check_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT (source_check_id) DO NOTHING",
          rusqlite::params![
            incident_id_str,
            subject_id_str,
            status,
            trigger,
            lat,
            lng,
            at_str,
            check_str,
          ],
        )?;
        let raw = tx.query_row(
          &format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents
             WHERE incident_id = ?1 OR source_check_id = ?2"
          ),
          rusqlite::params![incident_id_str, check_str],
          incident_row,
        )?;
        tx.commit()?;
        Ok((raw, inserted))
      })
      .await?;

    Ok(InsertedIncident { incident: raw.into_incident()?, created: inserted == 1 })
  }

  async fn get_incident(&self, incident_id: Uuid) -> Result<Option<Incident>> {
    let id_str = encode_uuid(incident_id);

    let raw: Option<RawIncident> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE incident_id = ?1"),
            rusqlite::params![id_str],
            incident_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawIncident::into_incident).transpose()
  }

  async fn list_active_incidents(&self) -> Result<Vec<ActiveIncident>> {
    let rows: Vec<(String, Option<String>)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT incident_id, created_at FROM incidents
           WHERE status = 'active'
           ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, created_at)| {
        Ok(ActiveIncident { incident_id: decode_uuid(&id)?, created_at })
      })
      .collect()
  }

  async fn append_location_history(
    &self,
    incident_id: Uuid,
    samples:     Vec<LocationSample>,
  ) -> Result<()> {
    if samples.is_empty() {
      return Ok(());
    }
    let id_str = encode_uuid(incident_id);
    let rows: Vec<(i64, f64, f64, String)> = samples
      .iter()
      .map(|s| (s.sample_id, s.point.lat, s.point.lng, encode_dt(s.recorded_at)))
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO incident_location_history (
               incident_id, sample_id, lat, lng, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (incident_id, sample_id) DO NOTHING",
          )?;
          for (sample_id, lat, lng, at) in &rows {
            stmt.execute(rusqlite::params![id_str, sample_id, lat, lng, at])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn location_history(&self, incident_id: Uuid) -> Result<Vec<LocationSample>> {
    let id_str = encode_uuid(incident_id);

    let raws: Vec<RawSample> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT sample_id, lat, lng, recorded_at FROM incident_location_history
           WHERE incident_id = ?1
           ORDER BY recorded_at, sample_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], sample_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSample::into_sample).collect()
  }

  async fn resolve_incident(&self, incident_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(incident_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE incidents SET status = 'resolved'
           WHERE incident_id = ?1 AND status = 'active'",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }
}

impl SafetyCheckStore for SqliteStore {
  async fn list_expired_checks(&self, now: DateTime<Utc>) -> Result<Vec<PendingCheck>> {
    let raws: Vec<RawCheck> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT check_id, subject_id, expires_at, responded_at
           FROM pending_safety_checks
           WHERE responded_at IS NULL",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawCheck {
              check_id:     row.get(0)?,
              subject_id:   row.get(1)?,
              expires_at:   row.get(2)?,
              responded_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Expiry is compared after parsing, so rows written with any supported
    // timestamp shape are judged on the same UTC clock. A row that cannot be
    // decoded is skipped; it must not hold up every other subject's checks.
    let mut expired = Vec::new();
    for raw in raws {
      let check_id = raw.check_id.clone();
      match raw.into_check() {
        Ok(check) if check.expires_at <= now => expired.push(check),
        Ok(_) => {}
        Err(e) => tracing::warn!(%check_id, error = %e, "skipping undecodable pending check"),
      }
    }
    expired.sort_by_key(|c| c.expires_at);
    Ok(expired)
  }

  async fn mark_responded(&self, check_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let id_str = encode_uuid(check_id);
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE pending_safety_checks SET responded_at = ?2
           WHERE check_id = ?1 AND responded_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }
}

impl LocationStore for SqliteStore {
  async fn location_samples(&self, subject_id: Uuid) -> Result<Vec<LocationSample>> {
    let id_str = encode_uuid(subject_id);

    let raws: Vec<RawSample> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT sample_id, lat, lng, recorded_at FROM location_samples
           WHERE user_id = ?1
           ORDER BY recorded_at, sample_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], sample_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSample::into_sample).collect()
  }
}
