//! Storage traits consumed by the escalation engine.
//!
//! Each trait is a narrow read/write view over one concern so the engine can
//! run against an in-memory fake as easily as against `vigil-store-sqlite`.
//! All of them share the backend's error type through [`Store`].
//!
//! All methods return `Send` futures so implementations can be shared across
//! tasks in a multi-threaded tokio runtime.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  contact::{Contact, ReachableAddresses, Tier},
  incident::{
    ActiveIncident, Grant, GrantOutcome, Incident, InsertedIncident, NewIncident,
    PendingCheck,
  },
  subject::{LocationSample, Subject},
};

/// Common supertrait carrying the backend's error type.
pub trait Store: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

// ─── Contact directory ───────────────────────────────────────────────────────

/// Read-only view over subjects and their contacts.
pub trait ContactDirectory: Store {
  /// Retrieve a subject by UUID. Returns `None` if not found.
  fn get_subject(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  /// All of `subject_id`'s contacts at exactly `tier`, in no particular
  /// order. An unconfigured tier yields an empty list.
  fn tier_contacts(
    &self,
    subject_id: Uuid,
    tier: Tier,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  /// Every channel address the contact's recipient can be reached at.
  fn reachable_addresses(
    &self,
    contact_id: Uuid,
  ) -> impl Future<Output = Result<ReachableAddresses, Self::Error>> + Send + '_;
}

// ─── Notification ledger ─────────────────────────────────────────────────────

/// The idempotent record of who has been notified about which incident.
pub trait NotificationLedger: Store {
  fn has_grant(
    &self,
    incident_id: Uuid,
    contact_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record a grant if none exists for `(incident_id, contact_id)`.
  ///
  /// Must be atomic under concurrent callers: exactly one observes
  /// [`GrantOutcome::Created`], every other observes
  /// [`GrantOutcome::AlreadyExists`]. Implementations enforce this with a
  /// uniqueness constraint, not an in-process lock.
  fn record_grant(
    &self,
    incident_id: Uuid,
    contact_id: Uuid,
    tier: Tier,
  ) -> impl Future<Output = Result<GrantOutcome, Self::Error>> + Send + '_;

  /// Contact UUIDs already granted for `incident_id`, across all tiers.
  fn list_notified_contacts(
    &self,
    incident_id: Uuid,
  ) -> impl Future<Output = Result<HashSet<Uuid>, Self::Error>> + Send + '_;

  /// Full ledger entries for `incident_id`, oldest first.
  fn list_grants(
    &self,
    incident_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Grant>, Self::Error>> + Send + '_;
}

// ─── Incidents ───────────────────────────────────────────────────────────────

pub trait IncidentStore: Store {
  /// Persist a new `active` incident. The store assigns the identifier and
  /// the creation timestamp.
  ///
  /// When `input.source_check_id` is already attached to an incident, the
  /// existing incident is returned with `created == false`.
  fn insert_incident(
    &self,
    input: NewIncident,
  ) -> impl Future<Output = Result<InsertedIncident, Self::Error>> + Send + '_;

  fn get_incident(
    &self,
    incident_id: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  /// Every incident whose status is `active`.
  fn list_active_incidents(
    &self,
  ) -> impl Future<Output = Result<Vec<ActiveIncident>, Self::Error>> + Send + '_;

  /// Append samples to the incident's location history, preserving their
  /// original timestamps. Re-appending a sample already present is a no-op.
  fn append_location_history(
    &self,
    incident_id: Uuid,
    samples: Vec<LocationSample>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The incident's location history, oldest first.
  fn location_history(
    &self,
    incident_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LocationSample>, Self::Error>> + Send + '_;

  /// Flip an active incident to `resolved`. Returns `false` if it was not
  /// active (already resolved or absent).
  fn resolve_incident(
    &self,
    incident_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Pending safety checks ───────────────────────────────────────────────────

pub trait SafetyCheckStore: Store {
  /// Checks with `expires_at <= now` that have not been responded to.
  fn list_expired_checks(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<PendingCheck>, Self::Error>> + Send + '_;

  /// Set `responded_at` on a still-pending check. Returns `false` if the
  /// check was already responded to (or does not exist); a responded check
  /// is never re-opened.
  fn mark_responded(
    &self,
    check_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Location samples ────────────────────────────────────────────────────────

pub trait LocationStore: Store {
  /// All of the subject's samples, oldest first.
  fn location_samples(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LocationSample>, Self::Error>> + Send + '_;
}

/// Everything the escalation engine needs from a backend.
pub trait EscalationStore:
  ContactDirectory + NotificationLedger + IncidentStore + SafetyCheckStore + LocationStore
{
}

impl<T> EscalationStore for T where
  T: ContactDirectory + NotificationLedger + IncidentStore + SafetyCheckStore + LocationStore
{
}
