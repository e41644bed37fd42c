//! [`SweepScheduler`]: the periodic expiry-and-promotion pass.
//!
//! One sweep:
//!
//! 1. converts every overdue, unanswered safety check into an incident and
//!    notifies tier 1;
//! 2. promotes every active incident whose elapsed time crosses a threshold:
//!    tier 2 after `tier2_after`, tiers 2 *and* 3 after `tier3_after`.
//!
//! Items are processed concurrently on a bounded pool. Failures are
//! contained to the item. Overlapping sweeps are safe because every step is
//! idempotent; there is no lock.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::{
  sync::Semaphore,
  task::JoinSet,
  time::{Instant, timeout_at},
};
use uuid::Uuid;
use vigil_core::{contact::Tier, incident::ActiveIncident, store::EscalationStore, time::parse_utc};

use crate::{EscalationConfig, EscalationEngine, IncidentLifecycle, engine::bounded};

/// Aggregate result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  /// Expired checks converted into incidents.
  pub processed:          usize,
  /// Expired checks left pending after a failure.
  pub failed_checks:      usize,
  /// Active incidents considered for promotion.
  pub incidents_examined: usize,
  /// Successful `escalate` calls for tiers 2 and 3.
  pub promotions:         usize,
  /// Contacts newly notified across the whole sweep, tier 1 included.
  pub newly_notified:     usize,
  /// Failed `escalate` calls for tiers 2 and 3.
  pub failed_promotions:  usize,
  /// Incidents skipped because their creation time is missing or malformed.
  pub skipped_incidents:  usize,
  /// Items left for the next sweep because the deadline passed.
  pub abandoned:          usize,
  /// Listing queries that failed outright.
  pub listing_failures:   usize,
}

/// Which tiers an incident should be escalated to after `elapsed`.
///
/// Tier 3 is reached even if tier 2 was never triggered, so a gap between
/// sweeps cannot strand an incident at tier 1.
pub fn promotion_tiers(elapsed: TimeDelta, config: &EscalationConfig) -> Vec<Tier> {
  if elapsed >= config.tier3_after() {
    vec![Tier::TWO, Tier::THREE]
  } else if elapsed >= config.tier2_after() {
    vec![Tier::TWO]
  } else {
    Vec::new()
  }
}

#[derive(Clone)]
enum CheckResult {
  Processed { notified: usize },
  Failed,
  Abandoned,
}

#[derive(Clone)]
enum PromotionResult {
  Examined { promotions: usize, failures: usize, notified: usize },
  Skipped,
  Abandoned,
}

pub struct SweepScheduler<S> {
  engine:    EscalationEngine<S>,
  lifecycle: IncidentLifecycle<S>,
}

impl<S> Clone for SweepScheduler<S> {
  fn clone(&self) -> Self {
    Self { engine: self.engine.clone(), lifecycle: self.lifecycle.clone() }
  }
}

impl<S> SweepScheduler<S>
where
  S: EscalationStore + 'static,
{
  pub fn new(engine: EscalationEngine<S>) -> Self {
    let lifecycle = IncidentLifecycle::new(engine.clone());
    Self { engine, lifecycle }
  }

  pub fn engine(&self) -> &EscalationEngine<S> { &self.engine }

  pub fn lifecycle(&self) -> &IncidentLifecycle<S> { &self.lifecycle }

  /// Run one sweep against the current time.
  pub async fn sweep(&self) -> SweepReport { self.sweep_at(Utc::now()).await }

  /// Run one sweep as of `now`. Never fails; see [`SweepReport`].
  pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
    let config = self.engine.config();
    let deadline = Instant::now() + config.sweep_deadline();
    let limit = config.storage_timeout();
    let store = Arc::clone(self.engine.store());
    let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut report = SweepReport::default();

    // ── Phase 1: expire overdue checks ────────────────────────────────────
    match bounded(limit, "list_expired_checks", store.list_expired_checks(now)).await {
      Ok(checks) => {
        let mut tasks: JoinSet<CheckResult> = JoinSet::new();
        for check in checks {
          let lifecycle = self.lifecycle.clone();
          tasks.spawn(gated(permits.clone(), deadline, CheckResult::Abandoned, async move {
            match lifecycle.create_from_expired_check(&check).await {
              Ok(opened) => CheckResult::Processed {
                notified: opened.escalation.map_or(0, |o| o.notified),
              },
              Err(e) => {
                tracing::warn!(check_id = %check.check_id, error = %e, "failed to expire check");
                CheckResult::Failed
              }
            }
          }));
        }
        for result in drain(&mut tasks, deadline, CheckResult::Abandoned).await {
          match result {
            CheckResult::Processed { notified } => {
              report.processed += 1;
              report.newly_notified += notified;
            }
            CheckResult::Failed => report.failed_checks += 1,
            CheckResult::Abandoned => report.abandoned += 1,
          }
        }
      }
      Err(e) => {
        tracing::warn!(error = %e, "could not list expired checks");
        report.listing_failures += 1;
      }
    }

    // ── Phase 2: promote active incidents ─────────────────────────────────
    match bounded(limit, "list_active_incidents", store.list_active_incidents()).await {
      Ok(incidents) => {
        report.incidents_examined = incidents.len();
        let mut tasks: JoinSet<PromotionResult> = JoinSet::new();
        for incident in incidents {
          let this = self.clone();
          tasks.spawn(gated(permits.clone(), deadline, PromotionResult::Abandoned, async move {
            this.promote(incident, now).await
          }));
        }
        for result in drain(&mut tasks, deadline, PromotionResult::Abandoned).await {
          match result {
            PromotionResult::Examined { promotions, failures, notified } => {
              report.promotions += promotions;
              report.failed_promotions += failures;
              report.newly_notified += notified;
            }
            PromotionResult::Skipped => report.skipped_incidents += 1,
            PromotionResult::Abandoned => report.abandoned += 1,
          }
        }
      }
      Err(e) => {
        tracing::warn!(error = %e, "could not list active incidents");
        report.listing_failures += 1;
      }
    }

    tracing::info!(
      processed = report.processed,
      failed_checks = report.failed_checks,
      promotions = report.promotions,
      newly_notified = report.newly_notified,
      skipped = report.skipped_incidents,
      abandoned = report.abandoned,
      "sweep complete"
    );
    report
  }

  async fn promote(&self, incident: ActiveIncident, now: DateTime<Utc>) -> PromotionResult {
    let incident_id = incident.incident_id;
    let created_at = match incident.created_at.as_deref().map(parse_utc) {
      Some(Ok(created_at)) => created_at,
      Some(Err(e)) => {
        tracing::warn!(%incident_id, error = %e, "skipping promotion");
        return PromotionResult::Skipped;
      }
      None => {
        tracing::warn!(%incident_id, "skipping promotion: no creation time");
        return PromotionResult::Skipped;
      }
    };

    let elapsed = now - created_at;
    let (mut promotions, mut failures, mut notified) = (0, 0, 0);
    for tier in promotion_tiers(elapsed, self.engine.config()) {
      match self.escalate_logged(incident_id, tier).await {
        Some(n) => {
          promotions += 1;
          notified += n;
        }
        None => failures += 1,
      }
    }
    PromotionResult::Examined { promotions, failures, notified }
  }

  async fn escalate_logged(&self, incident_id: Uuid, tier: Tier) -> Option<usize> {
    match self.engine.escalate(incident_id, tier).await {
      Ok(outcome) => Some(outcome.notified),
      Err(e) => {
        tracing::warn!(%incident_id, %tier, error = %e, "promotion failed");
        None
      }
    }
  }
}

/// Wait for a worker permit, then run `work` unless the deadline has
/// already passed.
async fn gated<T, F>(permits: Arc<Semaphore>, deadline: Instant, abandoned: T, work: F) -> T
where
  F: Future<Output = T>,
{
  let Ok(Ok(_permit)) = timeout_at(deadline, permits.acquire_owned()).await else {
    return abandoned;
  };
  if Instant::now() >= deadline {
    return abandoned;
  }
  work.await
}

/// Collect task results until all finish or the deadline passes.
///
/// Tasks still running at the deadline are detached, not aborted: each one
/// finishes its current item so no grant is left without its delivery
/// attempt. They are counted as abandoned here.
async fn drain<T>(tasks: &mut JoinSet<T>, deadline: Instant, abandoned: T) -> Vec<T>
where
  T: Clone + Send + 'static,
{
  let mut results = Vec::with_capacity(tasks.len());
  loop {
    match timeout_at(deadline, tasks.join_next()).await {
      Ok(Some(Ok(result))) => results.push(result),
      Ok(Some(Err(e))) => {
        tracing::warn!(error = %e, "sweep worker panicked");
      }
      Ok(None) => break,
      Err(_) => {
        let outstanding = tasks.len();
        tracing::warn!(outstanding, "sweep deadline reached; remaining work left for next sweep");
        results.extend(std::iter::repeat_n(abandoned, outstanding));
        tasks.detach_all();
        break;
      }
    }
  }
  results
}
