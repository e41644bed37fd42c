//! Push notifications through the FCM HTTP v1 API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use vigil_core::contact::ChannelKind;

use crate::{Channel, ChannelError, IncidentContext, token::AccessTokenSource};

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/v1";

pub struct PushChannel {
  client:     reqwest::Client,
  project_id: String,
  endpoint:   String,
  tokens:     Arc<dyn AccessTokenSource>,
}

impl PushChannel {
  pub fn new(
    client: reqwest::Client,
    project_id: impl Into<String>,
    tokens: Arc<dyn AccessTokenSource>,
  ) -> Self {
    Self {
      client,
      project_id: project_id.into(),
      endpoint: FCM_ENDPOINT.to_owned(),
      tokens,
    }
  }

  /// Point the channel at a different API root (staging, emulator).
  pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into();
    self
  }

  fn url(&self) -> String {
    format!(
      "{}/projects/{}/messages:send",
      self.endpoint.trim_end_matches('/'),
      self.project_id
    )
  }
}

/// The FCM `Message` body for one device.
pub fn message_body(device_token: &str, ctx: &IncidentContext) -> Value {
  json!({
    "message": {
      "token": device_token,
      "notification": {
        "title": ctx.title(),
        "body":  ctx.summary(),
      },
      "data": {
        "incident_id": ctx.incident_id.to_string(),
        "tier":        ctx.tier.to_string(),
        "link":        ctx.deep_link,
      },
      "android": { "priority": "high" },
      "apns": { "headers": { "apns-priority": "10" } },
    }
  })
}

#[async_trait]
impl Channel for PushChannel {
  fn kind(&self) -> ChannelKind { ChannelKind::Push }

  async fn send(&self, target: &str, ctx: &IncidentContext) -> Result<(), ChannelError> {
    let token = self.tokens.access_token().await?;

    let resp = self
      .client
      .post(self.url())
      .bearer_auth(token)
      .json(&message_body(target, ctx))
      .send()
      .await?;

    let status = resp.status();
    if status.is_success() {
      return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChannelError::Rejected { status: status.as_u16(), body })
  }
}
