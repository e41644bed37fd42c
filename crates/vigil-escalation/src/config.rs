//! Escalation policy, passed in at construction.

use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::{Error, Result};

/// How contacts within a tier are ordered for delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrdering {
  /// Located contacts first, nearest first; the rest by manual priority.
  #[default]
  DistanceFirst,
  /// Manual priority first; distance breaks ties and orders the
  /// unprioritised.
  PriorityFirst,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
  /// Elapsed time after which tier 2 is notified.
  pub tier2_after_secs:       u64,
  /// Elapsed time after which tiers 2 and 3 are notified.
  pub tier3_after_secs:       u64,
  /// Bound on concurrent per-check / per-incident work within one sweep.
  pub max_concurrency:        usize,
  /// Bound on every individual storage call.
  pub storage_timeout_ms:     u64,
  /// Items not started by this point are left for the next sweep.
  pub sweep_deadline_secs:    u64,
  pub ordering:               PriorityOrdering,
  /// Rank contacts by their most recent sample even when they do not share
  /// their location live. When off, only always-sharing contacts are
  /// ranked by distance.
  pub rank_by_recent_samples: bool,
  /// Prefix for the deep link sent to recipients; the incident id is
  /// appended.
  pub deep_link_base:         String,
}

impl Default for EscalationConfig {
  fn default() -> Self {
    Self {
      tier2_after_secs:       10 * 60,
      tier3_after_secs:       20 * 60,
      max_concurrency:        8,
      storage_timeout_ms:     5_000,
      sweep_deadline_secs:    90,
      ordering:               PriorityOrdering::default(),
      rank_by_recent_samples: true,
      deep_link_base:         "location-sharing://incidents".to_owned(),
    }
  }
}

impl EscalationConfig {
  pub fn validate(&self) -> Result<()> {
    if self.tier3_after_secs < self.tier2_after_secs {
      return Err(Error::Config(format!(
        "tier3_after_secs ({}) must not be less than tier2_after_secs ({})",
        self.tier3_after_secs, self.tier2_after_secs
      )));
    }
    if self.max_concurrency == 0 {
      return Err(Error::Config("max_concurrency must be at least 1".into()));
    }
    Ok(())
  }

  pub fn tier2_after(&self) -> TimeDelta { secs(self.tier2_after_secs) }

  pub fn tier3_after(&self) -> TimeDelta { secs(self.tier3_after_secs) }

  pub fn storage_timeout(&self) -> Duration { Duration::from_millis(self.storage_timeout_ms) }

  pub fn sweep_deadline(&self) -> Duration { Duration::from_secs(self.sweep_deadline_secs) }

  pub fn deep_link(&self, incident_id: uuid::Uuid) -> String {
    format!("{}/{incident_id}", self.deep_link_base.trim_end_matches('/'))
  }
}

fn secs(s: u64) -> TimeDelta {
  i64::try_from(s)
    .ok()
    .and_then(TimeDelta::try_seconds)
    .unwrap_or(TimeDelta::MAX)
}
