//! The [`Channel`] capability and the payload every channel receives.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;
use vigil_core::contact::{ChannelKind, Tier};

use crate::ChannelError;

/// What a recipient is told about an incident.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentContext {
  pub incident_id:  Uuid,
  /// Display name of the subject who needs help.
  pub subject_name: String,
  pub tier:         Tier,
  /// Where the client app should open, e.g. `location-sharing://incidents/<id>`.
  pub deep_link:    String,
}

impl IncidentContext {
  pub fn title(&self) -> String { "Emergency: Someone needs help".to_owned() }

  pub fn summary(&self) -> String {
    format!(
      "{} has triggered an emergency alert. Open the app to view their location and recent history.",
      self.subject_name
    )
  }
}

/// A delivery mechanism. New channels plug into the
/// [`Dispatcher`](crate::Dispatcher) without any change to the engine.
#[async_trait]
pub trait Channel: Send + Sync {
  /// Which address kind this channel delivers to.
  fn kind(&self) -> ChannelKind;

  /// Deliver `ctx` to a single `target` address.
  async fn send(&self, target: &str, ctx: &IncidentContext) -> Result<(), ChannelError>;
}
