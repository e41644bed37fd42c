//! [`IncidentLifecycle`]: open incidents and notify tier 1.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use vigil_core::{
  contact::Tier,
  incident::{Incident, InsertedIncident, NewIncident, PendingCheck, TriggerReason},
  store::EscalationStore,
};

use crate::{EscalationEngine, EscalationOutcome, Error, Result, engine::bounded};

/// An incident that has been opened (or found already open for the same
/// check), plus the result of its tier-1 escalation.
#[derive(Debug, Clone, Serialize)]
pub struct OpenedIncident {
  pub incident:   Incident,
  /// `false` when an earlier, interrupted attempt had already created it.
  pub created:    bool,
  /// `None` if tier-1 escalation failed; the failure is logged.
  pub escalation: Option<EscalationOutcome>,
}

pub struct IncidentLifecycle<S> {
  engine: EscalationEngine<S>,
}

impl<S> Clone for IncidentLifecycle<S> {
  fn clone(&self) -> Self { Self { engine: self.engine.clone() } }
}

impl<S> IncidentLifecycle<S>
where
  S: EscalationStore + 'static,
{
  pub fn new(engine: EscalationEngine<S>) -> Self { Self { engine } }

  /// Convert an expired pending check into an incident.
  ///
  /// Steps run in the order insert incident, copy history, mark the check
  /// responded, escalate tier 1. Any storage failure before the check is
  /// marked leaves it pending for the next sweep; re-running converges on
  /// the same incident because inserts are keyed by the check.
  pub async fn create_from_expired_check(&self, check: &PendingCheck) -> Result<OpenedIncident> {
    let limit = self.engine.config().storage_timeout();
    let store = &**self.engine.store();

    let opened = self
      .open(check.subject_id, TriggerReason::CurfewTimeout, Some(check.check_id))
      .await?;

    let marked =
      bounded(limit, "mark_responded", store.mark_responded(check.check_id, Utc::now())).await?;
    if !marked {
      tracing::debug!(check_id = %check.check_id, "check was already marked responded");
    }

    let escalation = self.escalate_first_tier(opened.incident.incident_id).await;
    Ok(OpenedIncident { incident: opened.incident, created: opened.created, escalation })
  }

  /// Open an incident for an external trigger (e.g. a panic button) and
  /// notify tier 1 immediately.
  pub async fn create_from_trigger(
    &self,
    subject_id: Uuid,
    trigger:    TriggerReason,
  ) -> Result<OpenedIncident> {
    let limit = self.engine.config().storage_timeout();
    let store = &**self.engine.store();

    bounded(limit, "get_subject", store.get_subject(subject_id))
      .await?
      .ok_or(Error::SubjectNotFound(subject_id))?;

    let opened = self.open(subject_id, trigger, None).await?;
    let escalation = self.escalate_first_tier(opened.incident.incident_id).await;
    Ok(OpenedIncident { incident: opened.incident, created: opened.created, escalation })
  }

  async fn open(
    &self,
    subject_id:      Uuid,
    trigger:         TriggerReason,
    source_check_id: Option<Uuid>,
  ) -> Result<InsertedIncident> {
    let limit = self.engine.config().storage_timeout();
    let store = &**self.engine.store();

    let samples = bounded(limit, "location_samples", store.location_samples(subject_id)).await?;
    let last_known = samples.last().map(|s| s.point);

    let inserted = bounded(
      limit,
      "insert_incident",
      store.insert_incident(NewIncident { subject_id, trigger, last_known, source_check_id }),
    )
    .await?;
    let incident_id = inserted.incident.incident_id;

    let copied = samples.len();
    bounded(limit, "append_location_history", store.append_location_history(incident_id, samples))
      .await?;

    tracing::info!(
      %incident_id,
      %subject_id,
      trigger = %inserted.incident.trigger,
      created = inserted.created,
      history = copied,
      "incident opened"
    );
    Ok(inserted)
  }

  async fn escalate_first_tier(&self, incident_id: Uuid) -> Option<EscalationOutcome> {
    match self.engine.escalate(incident_id, Tier::ONE).await {
      Ok(outcome) => Some(outcome),
      Err(e) => {
        tracing::error!(%incident_id, error = %e, "tier-1 escalation failed");
        None
      }
    }
  }
}
