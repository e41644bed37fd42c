//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are written as RFC 3339 UTC with fixed microsecond precision so
//! that lexicographic comparison in SQL matches chronological order. They are
//! read back through [`vigil_core::time::parse_utc`], which also accepts rows
//! written by other tools without a zone suffix.

use chrono::{DateTime, SecondsFormat, Utc};
use vigil_core::{
  contact::{Contact, Tier},
  incident::{Grant, Incident, IncidentStatus, PendingCheck, TriggerReason},
  subject::{GeoPoint, LocationSample, Subject},
  time::parse_utc,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  parse_utc(s).map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Points ──────────────────────────────────────────────────────────────────

fn decode_point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
  match (lat, lng) {
    (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
    _ => None,
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from `subjects`, joined with the latest location sample.
pub struct RawSubject {
  pub subject_id:   String,
  pub display_name: String,
  pub lat:          Option<f64>,
  pub lng:          Option<f64>,
}

impl RawSubject {
  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id:   decode_uuid(&self.subject_id)?,
      display_name: self.display_name,
      last_known:   decode_point(self.lat, self.lng),
    })
  }
}

/// Raw values read from `contacts`, joined with the recipient's latest
/// location sample.
pub struct RawContact {
  pub contact_id:   String,
  pub subject_id:   String,
  pub recipient_id: String,
  pub tier:         i64,
  pub priority:     Option<i32>,
  pub always_share: bool,
  pub lat:          Option<f64>,
  pub lng:          Option<f64>,
}

impl RawContact {
  pub fn into_contact(self) -> Result<Contact> {
    Ok(Contact {
      contact_id:   decode_uuid(&self.contact_id)?,
      subject_id:   decode_uuid(&self.subject_id)?,
      recipient_id: decode_uuid(&self.recipient_id)?,
      tier:         Tier::new(self.tier)?,
      priority:     self.priority,
      always_share: self.always_share,
      location:     decode_point(self.lat, self.lng),
    })
  }
}

/// Raw values read from an `incidents` row.
pub struct RawIncident {
  pub incident_id:     String,
  pub subject_id:      String,
  pub status:          String,
  pub trigger:         String,
  pub last_known_lat:  Option<f64>,
  pub last_known_lng:  Option<f64>,
  pub created_at:      String,
  pub source_check_id: Option<String>,
}

impl RawIncident {
  pub fn into_incident(self) -> Result<Incident> {
    Ok(Incident {
      incident_id:     decode_uuid(&self.incident_id)?,
      subject_id:      decode_uuid(&self.subject_id)?,
      status:          IncidentStatus::parse(&self.status)?,
      trigger:         TriggerReason::from(self.trigger),
      last_known:      decode_point(self.last_known_lat, self.last_known_lng),
      created_at:      decode_dt(&self.created_at)?,
      source_check_id: self
        .source_check_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
    })
  }
}

/// Raw values read from a `pending_safety_checks` row.
pub struct RawCheck {
  pub check_id:     String,
  pub subject_id:   String,
  pub expires_at:   String,
  pub responded_at: Option<String>,
}

impl RawCheck {
  pub fn into_check(self) -> Result<PendingCheck> {
    Ok(PendingCheck {
      check_id:     decode_uuid(&self.check_id)?,
      subject_id:   decode_uuid(&self.subject_id)?,
      expires_at:   decode_dt(&self.expires_at)?,
      responded_at: self.responded_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw values read from an `incident_grants` row.
pub struct RawGrant {
  pub incident_id: String,
  pub contact_id:  String,
  pub tier:        i64,
  pub notified_at: String,
}

impl RawGrant {
  pub fn into_grant(self) -> Result<Grant> {
    Ok(Grant {
      incident_id: decode_uuid(&self.incident_id)?,
      contact_id:  decode_uuid(&self.contact_id)?,
      tier:        Tier::new(self.tier)?,
      notified_at: decode_dt(&self.notified_at)?,
    })
  }
}

/// Raw values for one location point, from either sample table.
pub struct RawSample {
  pub sample_id:   i64,
  pub lat:         f64,
  pub lng:         f64,
  pub recorded_at: String,
}

impl RawSample {
  pub fn into_sample(self) -> Result<LocationSample> {
    Ok(LocationSample {
      sample_id:   self.sample_id,
      point:       GeoPoint { lat: self.lat, lng: self.lng },
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
