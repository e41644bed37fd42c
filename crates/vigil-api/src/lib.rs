//! JSON REST API for Vigil.
//!
//! Exposes an axum [`Router`] over a [`SweepScheduler`], which carries the
//! escalation engine, the incident lifecycle and the store. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vigil_api::api_router(scheduler.clone()))
//! ```

pub mod error;
pub mod escalate;
pub mod incidents;
pub mod sweep;

use axum::{
  Router,
  routing::{get, post},
};
use vigil_core::store::EscalationStore;
use vigil_escalation::SweepScheduler;

pub use error::ApiError;

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(scheduler: SweepScheduler<S>) -> Router<()>
where
  S: EscalationStore + 'static,
{
  Router::new()
    .route("/sweep", post(sweep::trigger::<S>))
    .route("/escalate", post(escalate::escalate_now::<S>))
    // Incidents
    .route("/incidents", post(incidents::create::<S>))
    .route("/incidents/{id}", get(incidents::get_one::<S>))
    .route("/incidents/{id}/resolve", post(incidents::resolve::<S>))
    .with_state(scheduler)
}
