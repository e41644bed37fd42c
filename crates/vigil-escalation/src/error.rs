//! Error type for `vigil-escalation`.
//!
//! Errors describe the failure of a single unit of work (one incident, one
//! pending check). The sweep contains them; only explicit calls such as
//! [`EscalationEngine::escalate`](crate::EscalationEngine::escalate) return
//! them to a caller.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("incident not found: {0}")]
  IncidentNotFound(Uuid),

  #[error("subject not found: {0}")]
  SubjectNotFound(Uuid),

  #[error("core error: {0}")]
  Core(#[from] vigil_core::Error),

  #[error("storage failure during {op}: {source}")]
  Storage {
    op:     &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("storage call {op} timed out after {after:?}")]
  Timeout { op: &'static str, after: Duration },

  #[error("escalation task aborted: {0}")]
  Aborted(String),

  #[error("invalid configuration: {0}")]
  Config(String),
}

impl Error {
  /// Whether the failure is about a missing record rather than a fault.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::IncidentNotFound(_) | Self::SubjectNotFound(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
