//! `POST /sweep`: run one escalation sweep now and report what it did.

use axum::{Json, extract::State};
use vigil_core::store::EscalationStore;
use vigil_escalation::{SweepReport, SweepScheduler};

/// `POST /sweep`
///
/// A sweep never fails as a whole; per-item failures are counted in the
/// report.
pub async fn trigger<S>(State(scheduler): State<SweepScheduler<S>>) -> Json<SweepReport>
where
  S: EscalationStore + 'static,
{
  Json(scheduler.sweep().await)
}
