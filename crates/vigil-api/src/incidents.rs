//! Handlers for `/incidents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/incidents` | Body: `{"subject_id":"…","reason":"manual_panic"}`; 201 + tier-1 outcome |
//! | `GET`  | `/incidents/:id` | Incident, location history and grants; 404 if not found |
//! | `POST` | `/incidents/:id/resolve` | Stops further promotion |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{
  incident::{Grant, Incident, TriggerReason},
  store::{EscalationStore, IncidentStore, NotificationLedger},
  subject::LocationSample,
};
use vigil_escalation::SweepScheduler;

use crate::error::ApiError;

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub subject_id: Uuid,
  /// Defaults to `manual_panic`.
  pub reason:     Option<TriggerReason>,
}

/// `POST /incidents`
pub async fn create<S>(
  State(scheduler): State<SweepScheduler<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EscalationStore + 'static,
{
  let reason = body.reason.unwrap_or(TriggerReason::ManualPanic);
  let opened = scheduler.lifecycle().create_from_trigger(body.subject_id, reason).await?;
  Ok((StatusCode::CREATED, Json(opened)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct IncidentView {
  #[serde(flatten)]
  pub incident:         Incident,
  pub location_history: Vec<LocationSample>,
  pub grants:           Vec<Grant>,
}

/// `GET /incidents/:id`
pub async fn get_one<S>(
  State(scheduler): State<SweepScheduler<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<IncidentView>, ApiError>
where
  S: EscalationStore + 'static,
{
  let store = scheduler.engine().store();
  let incident = store
    .get_incident(id)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::NotFound(format!("incident {id}")))?;
  let location_history = store.location_history(id).await.map_err(ApiError::internal)?;
  let grants = store.list_grants(id).await.map_err(ApiError::internal)?;
  Ok(Json(IncidentView { incident, location_history, grants }))
}

// ─── Resolve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Resolved {
  pub incident_id: Uuid,
  /// `false` when the incident was already resolved.
  pub changed:     bool,
}

/// `POST /incidents/:id/resolve`
pub async fn resolve<S>(
  State(scheduler): State<SweepScheduler<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Resolved>, ApiError>
where
  S: EscalationStore + 'static,
{
  let store = scheduler.engine().store();
  if store.get_incident(id).await.map_err(ApiError::internal)?.is_none() {
    return Err(ApiError::NotFound(format!("incident {id}")));
  }
  let changed = store.resolve_incident(id).await.map_err(ApiError::internal)?;
  if changed {
    tracing::info!(incident_id = %id, "incident resolved");
  }
  Ok(Json(Resolved { incident_id: id, changed }))
}
