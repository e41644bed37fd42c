//! Incidents, pending safety checks and notification grants.
//!
//! An incident is opened once per triggering event and is only ever mutated
//! to resolve it or to append location history. Grants are the ledger of who
//! has been told about an incident; there is at most one per
//! `(incident, contact)` pair.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, contact::Tier, subject::GeoPoint};

// ─── Status and trigger ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IncidentStatus {
  Active,
  Resolved,
}

impl IncidentStatus {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownStatus(s.to_owned()))
  }
}

/// Why an incident was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerReason {
  /// A pending safety check expired without a response.
  CurfewTimeout,
  /// The subject raised the alarm themselves.
  ManualPanic,
  /// Any other externally supplied reason, stored verbatim.
  Other(String),
}

impl TriggerReason {
  pub fn as_str(&self) -> &str {
    match self {
      Self::CurfewTimeout => "curfew_timeout",
      Self::ManualPanic => "manual_panic",
      Self::Other(s) => s,
    }
  }
}

impl fmt::Display for TriggerReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TriggerReason {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Ok(match s {
      "curfew_timeout" => Self::CurfewTimeout,
      "manual_panic" => Self::ManualPanic,
      other => Self::Other(other.to_owned()),
    })
  }
}

impl From<String> for TriggerReason {
  fn from(s: String) -> Self {
    match s.parse() {
      Ok(reason) => reason,
      Err(never) => match never {},
    }
  }
}

impl From<TriggerReason> for String {
  fn from(r: TriggerReason) -> String { r.as_str().to_owned() }
}

// ─── Incident ────────────────────────────────────────────────────────────────

/// A single emergency, from trigger until resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
  pub incident_id:     Uuid,
  pub subject_id:      Uuid,
  pub status:          IncidentStatus,
  pub trigger:         TriggerReason,
  /// Location snapshot taken when the incident was opened.
  pub last_known:      Option<GeoPoint>,
  /// Authoritative start time; every elapsed-time computation is relative
  /// to this instant.
  pub created_at:      DateTime<Utc>,
  /// The pending check this incident was opened for, if any.
  pub source_check_id: Option<Uuid>,
}

/// Input for [`IncidentStore::insert_incident`](crate::store::IncidentStore).
#[derive(Debug, Clone)]
pub struct NewIncident {
  pub subject_id:      Uuid,
  pub trigger:         TriggerReason,
  pub last_known:      Option<GeoPoint>,
  pub source_check_id: Option<Uuid>,
}

/// The result of inserting an incident.
///
/// Inserting twice for the same `source_check_id` returns the existing
/// incident with `created == false`, so overlapping sweeps converge on one
/// incident per expired check.
#[derive(Debug, Clone)]
pub struct InsertedIncident {
  pub incident: Incident,
  pub created:  bool,
}

/// An active incident as listed for promotion.
///
/// The creation time is left as the raw stored text; the sweep parses it
/// so that a malformed value skips one incident rather than failing the
/// whole listing.
#[derive(Debug, Clone)]
pub struct ActiveIncident {
  pub incident_id: Uuid,
  pub created_at:  Option<String>,
}

// ─── Pending safety check ────────────────────────────────────────────────────

/// A scheduled check-in the subject must answer before `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCheck {
  pub check_id:     Uuid,
  pub subject_id:   Uuid,
  pub expires_at:   DateTime<Utc>,
  /// `None` while still pending. Terminal once set.
  pub responded_at: Option<DateTime<Utc>>,
}

impl PendingCheck {
  pub fn is_pending(&self) -> bool { self.responded_at.is_none() }
}

// ─── Grants ──────────────────────────────────────────────────────────────────

/// A ledger entry: `contact_id` was notified about `incident_id` at `tier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
  pub incident_id: Uuid,
  pub contact_id:  Uuid,
  pub tier:        Tier,
  pub notified_at: DateTime<Utc>,
}

/// The result of attempting to record a grant.
#[derive(Debug, Clone, PartialEq)]
pub enum GrantOutcome {
  /// This call created the grant; the caller owns its dispatch.
  Created(Grant),
  /// A grant for this `(incident, contact)` pair already existed.
  AlreadyExists,
}
