//! The Vigil escalation engine.
//!
//! - [`EscalationEngine`] notifies one tier of an incident's contacts,
//!   exactly once per contact.
//! - [`IncidentLifecycle`] opens incidents from expired safety checks or
//!   external triggers and notifies tier 1 straight away.
//! - [`SweepScheduler`] is the periodic pass that expires overdue checks and
//!   promotes active incidents to wider tiers as time passes.
//!
//! Every operation is idempotent, so overlapping sweeps and retried calls
//! are safe without any in-process locking.

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod order;
pub mod sweep;

pub use config::{EscalationConfig, PriorityOrdering};
pub use engine::{EscalationEngine, EscalationOutcome};
pub use error::{Error, Result};
pub use lifecycle::{IncidentLifecycle, OpenedIncident};
pub use sweep::{SweepReport, SweepScheduler};

#[cfg(test)]
mod tests;
