//! Fan-out of one incident notification to many contacts and channels.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::{StreamExt as _, future::join_all, stream};
use serde::Serialize;
use tokio::time::timeout;
use vigil_core::{
  contact::{ChannelKind, Contact},
  store::ContactDirectory,
};

use crate::{Channel, ChannelError, IncidentContext};

/// Aggregate delivery counts for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
  /// Successful deliveries per channel.
  pub sent:          BTreeMap<ChannelKind, usize>,
  /// Failed or timed-out deliveries per channel.
  pub failed:        BTreeMap<ChannelKind, usize>,
  /// Contacts with no address on any configured channel.
  pub unreachable:   usize,
  /// Contacts whose addresses could not be looked up.
  pub lookup_failed: usize,
}

impl DispatchReport {
  pub fn merge(&mut self, other: DispatchReport) {
    for (kind, n) in other.sent {
      *self.sent.entry(kind).or_default() += n;
    }
    for (kind, n) in other.failed {
      *self.failed.entry(kind).or_default() += n;
    }
    self.unreachable += other.unreachable;
    self.lookup_failed += other.lookup_failed;
  }

  pub fn sent_on(&self, kind: ChannelKind) -> usize {
    self.sent.get(&kind).copied().unwrap_or(0)
  }

  pub fn failed_on(&self, kind: ChannelKind) -> usize {
    self.failed.get(&kind).copied().unwrap_or(0)
  }
}

/// Sends notifications over every registered channel.
///
/// Cheap to clone; channels are shared.
#[derive(Clone)]
pub struct Dispatcher {
  channels:       Vec<Arc<dyn Channel>>,
  send_timeout:   Duration,
  lookup_timeout: Duration,
  max_in_flight:  usize,
}

impl Dispatcher {
  pub fn new(send_timeout: Duration) -> Self {
    Self {
      channels: Vec::new(),
      send_timeout,
      lookup_timeout: send_timeout,
      max_in_flight: 8,
    }
  }

  pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
    self.channels.push(channel);
    self
  }

  /// Bound on each address lookup; defaults to the send timeout.
  pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
    self.lookup_timeout = lookup_timeout;
    self
  }

  /// Cap on contacts notified concurrently within one dispatch.
  pub fn with_max_in_flight(mut self, n: usize) -> Self {
    self.max_in_flight = n.max(1);
    self
  }

  pub fn channel_kinds(&self) -> Vec<ChannelKind> {
    self.channels.iter().map(|c| c.kind()).collect()
  }

  /// Notify `contacts`, started in the given order.
  ///
  /// Never fails: each contact and each channel is an independent attempt
  /// whose outcome lands in the returned report.
  pub async fn dispatch<D>(
    &self,
    directory: &D,
    contacts:  &[Contact],
    ctx:       &IncidentContext,
  ) -> DispatchReport
  where
    D: ContactDirectory,
  {
    let pending: Vec<_> =
      contacts.iter().map(|contact| self.notify_contact(directory, contact, ctx)).collect();
    stream::iter(pending)
      .buffer_unordered(self.max_in_flight)
      .fold(DispatchReport::default(), |mut acc, report| async move {
        acc.merge(report);
        acc
      })
      .await
  }

  async fn notify_contact<D>(
    &self,
    directory: &D,
    contact:   &Contact,
    ctx:       &IncidentContext,
  ) -> DispatchReport
  where
    D: ContactDirectory,
  {
    let mut report = DispatchReport::default();
    let contact_id = contact.contact_id;

    let addresses =
      match timeout(self.lookup_timeout, directory.reachable_addresses(contact_id)).await {
        Ok(Ok(addresses)) => addresses,
        Ok(Err(e)) => {
          tracing::warn!(%contact_id, error = %e, "address lookup failed");
          report.lookup_failed += 1;
          return report;
        }
        Err(_) => {
          tracing::warn!(%contact_id, "address lookup timed out");
          report.lookup_failed += 1;
          return report;
        }
      };

    let attempts: Vec<(&Arc<dyn Channel>, &str)> = self
      .channels
      .iter()
      .flat_map(|ch| addresses.for_channel(ch.kind()).map(move |target| (ch, target)))
      .collect();

    if attempts.is_empty() {
      tracing::debug!(%contact_id, "no reachable address on any configured channel");
      report.unreachable += 1;
      return report;
    }

    let outcomes = join_all(attempts.into_iter().map(|(ch, target)| async move {
      let result = match timeout(self.send_timeout, ch.send(target, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout(self.send_timeout)),
      };
      (ch.kind(), result)
    }))
    .await;

    for (kind, result) in outcomes {
      match result {
        Ok(()) => {
          tracing::debug!(%contact_id, channel = %kind, "delivered");
          *report.sent.entry(kind).or_default() += 1;
        }
        Err(e) => {
          tracing::warn!(%contact_id, channel = %kind, error = %e, "delivery failed");
          *report.failed.entry(kind).or_default() += 1;
        }
      }
    }
    report
  }
}
