//! Error type for delivery attempts.

use std::time::Duration;

use thiserror::Error;

/// Why a single send did not go through. Always contained by the
/// dispatcher; never surfaces to the escalation engine.
#[derive(Debug, Error)]
pub enum ChannelError {
  /// Credentials are missing or could not be acquired.
  #[error("channel unavailable: {0}")]
  Unavailable(String),

  /// The provider answered with a non-success status.
  #[error("provider rejected delivery ({status}): {body}")]
  Rejected { status: u16, body: String },

  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("send timed out after {0:?}")]
  Timeout(Duration),
}
