//! `POST /escalate`: notify one tier of an incident immediately.
//!
//! Body: `{"incident_id": "<uuid>", "tier": 2}`. `tier` defaults to 1.
//! Repeating a call notifies nobody new.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use uuid::Uuid;
use vigil_core::{contact::Tier, store::EscalationStore};
use vigil_escalation::{EscalationOutcome, SweepScheduler};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct EscalateBody {
  pub incident_id: Option<Uuid>,
  pub tier:        Option<i64>,
}

/// `POST /escalate`
pub async fn escalate_now<S>(
  State(scheduler): State<SweepScheduler<S>>,
  body: Result<Json<EscalateBody>, JsonRejection>,
) -> Result<Json<EscalationOutcome>, ApiError>
where
  S: EscalationStore + 'static,
{
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let incident_id = body
    .incident_id
    .ok_or_else(|| ApiError::BadRequest("incident_id is required".into()))?;
  let tier = match body.tier {
    Some(n) => Tier::new(n).map_err(|e| ApiError::BadRequest(e.to_string()))?,
    None => Tier::ONE,
  };

  let outcome = scheduler.engine().escalate(incident_id, tier).await?;
  Ok(Json(outcome))
}
