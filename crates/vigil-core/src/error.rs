//! Error types for `vigil-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid tier: {0} (tiers start at 1)")]
  InvalidTier(i64),

  #[error("unparseable timestamp: {0:?}")]
  TimestampUnparseable(String),

  #[error("unknown channel kind: {0:?}")]
  UnknownChannel(String),

  #[error("unknown incident status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
