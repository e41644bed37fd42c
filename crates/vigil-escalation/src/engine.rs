//! [`EscalationEngine`]: notify one tier of an incident's contacts.

use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::timeout;
use uuid::Uuid;
use vigil_core::{
  contact::{ChannelKind, Contact, Tier},
  incident::GrantOutcome,
  store::EscalationStore,
};
use vigil_notify::{Dispatcher, IncidentContext};

use crate::{
  EscalationConfig, Error, Result,
  order::{hide_unshared_locations, order_contacts},
};

/// Run a storage call under the configured bound, folding backend errors
/// and timeouts into [`Error`].
pub(crate) async fn bounded<T, E, F>(limit: Duration, op: &'static str, fut: F) -> Result<T>
where
  F: Future<Output = Result<T, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  match timeout(limit, fut).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(Error::Storage { op, source: Box::new(e) }),
    Err(_) => Err(Error::Timeout { op, after: limit }),
  }
}

/// The result of one `escalate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationOutcome {
  pub incident_id:      Uuid,
  pub tier:             u32,
  /// Contacts configured at this tier.
  pub contacts_at_tier: usize,
  /// Contacts skipped because an earlier call already granted them.
  pub already_notified: usize,
  /// Contacts newly granted (and therefore dispatched to) by this call.
  pub notified:         usize,
  /// Contacts whose grant could not be recorded; retried on the next call.
  pub grant_failures:   usize,
  /// Successful deliveries per channel.
  pub sent:             BTreeMap<ChannelKind, usize>,
  /// Failed deliveries per channel.
  pub failed:           BTreeMap<ChannelKind, usize>,
  /// Newly granted contacts with no address on any channel.
  pub unreachable:      usize,
}

/// Notifies the contacts of one tier, at most once per contact per
/// incident.
///
/// Cheap to clone; the store and configuration are shared.
pub struct EscalationEngine<S> {
  store:      Arc<S>,
  dispatcher: Dispatcher,
  config:     Arc<EscalationConfig>,
}

impl<S> Clone for EscalationEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      dispatcher: self.dispatcher.clone(),
      config:     Arc::clone(&self.config),
    }
  }
}

impl<S> EscalationEngine<S>
where
  S: EscalationStore + 'static,
{
  pub fn new(store: Arc<S>, dispatcher: Dispatcher, config: Arc<EscalationConfig>) -> Self {
    Self { store, dispatcher, config }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &EscalationConfig { &self.config }

  /// Notify every not-yet-notified contact of `incident_id` at `tier`.
  ///
  /// Idempotent: a second call for the same tier notifies nobody. The work
  /// runs on its own task, so a caller that stops waiting cannot leave a
  /// recorded grant without its delivery attempt.
  pub async fn escalate(&self, incident_id: Uuid, tier: Tier) -> Result<EscalationOutcome> {
    let engine = self.clone();
    tokio::spawn(async move { engine.run(incident_id, tier).await })
      .await
      .map_err(|e| Error::Aborted(e.to_string()))?
  }

  async fn run(&self, incident_id: Uuid, tier: Tier) -> Result<EscalationOutcome> {
    let limit = self.config.storage_timeout();
    let store = &*self.store;

    let incident = bounded(limit, "get_incident", store.get_incident(incident_id))
      .await?
      .ok_or(Error::IncidentNotFound(incident_id))?;

    let mut outcome = EscalationOutcome { incident_id, tier: tier.get(), ..Default::default() };

    let mut contacts =
      bounded(limit, "tier_contacts", store.tier_contacts(incident.subject_id, tier)).await?;
    outcome.contacts_at_tier = contacts.len();
    if contacts.is_empty() {
      tracing::debug!(%incident_id, %tier, "no contacts at tier");
      return Ok(outcome);
    }

    let subject = bounded(limit, "get_subject", store.get_subject(incident.subject_id))
      .await?
      .ok_or(Error::SubjectNotFound(incident.subject_id))?;

    if !self.config.rank_by_recent_samples {
      hide_unshared_locations(&mut contacts);
    }
    let ordered = order_contacts(contacts, incident.last_known, self.config.ordering);
    let notified =
      bounded(limit, "list_notified_contacts", store.list_notified_contacts(incident_id)).await?;

    let mut granted: Vec<Contact> = Vec::new();
    for contact in ordered {
      if notified.contains(&contact.contact_id) {
        outcome.already_notified += 1;
        continue;
      }
      let contact_id = contact.contact_id;
      match bounded(limit, "record_grant", store.record_grant(incident_id, contact_id, tier)).await
      {
        Ok(GrantOutcome::Created(_)) => granted.push(contact),
        // Lost a race with a concurrent escalation; the winner dispatches.
        Ok(GrantOutcome::AlreadyExists) => {
          tracing::debug!(%incident_id, %contact_id, "grant already recorded concurrently");
          outcome.already_notified += 1;
        }
        Err(e @ Error::Timeout { .. }) => {
          if self.grant_landed(incident_id, contact_id).await {
            tracing::warn!(%incident_id, %contact_id, error = %e, "grant committed after timeout");
            granted.push(contact);
          } else {
            tracing::warn!(%incident_id, %contact_id, error = %e, "could not record grant");
            outcome.grant_failures += 1;
          }
        }
        Err(e) => {
          tracing::warn!(%incident_id, %contact_id, error = %e, "could not record grant");
          outcome.grant_failures += 1;
        }
      }
    }

    outcome.notified = granted.len();
    if granted.is_empty() {
      return Ok(outcome);
    }

    let ctx = IncidentContext {
      incident_id,
      subject_name: subject.display_name,
      tier,
      deep_link: self.config.deep_link(incident_id),
    };
    let report = self.dispatcher.dispatch(store, &granted, &ctx).await;

    outcome.sent = report.sent;
    outcome.failed = report.failed;
    outcome.unreachable = report.unreachable + report.lookup_failed;

    tracing::info!(
      %incident_id,
      %tier,
      notified = outcome.notified,
      already_notified = outcome.already_notified,
      sent = ?outcome.sent,
      failed = ?outcome.failed,
      "escalated"
    );
    Ok(outcome)
  }

  /// Whether a timed-out `record_grant` went on to commit. The insert is not
  /// cancelled by the timeout, so a grant that exists now must still be
  /// dispatched here or no later call ever will.
  async fn grant_landed(&self, incident_id: Uuid, contact_id: Uuid) -> bool {
    let limit = self.config.storage_timeout();
    match bounded(limit, "has_grant", self.store.has_grant(incident_id, contact_id)).await {
      Ok(exists) => exists,
      Err(e) => {
        tracing::warn!(%incident_id, %contact_id, error = %e, "could not confirm grant");
        false
      }
    }
  }
}
