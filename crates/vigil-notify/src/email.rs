//! Email notifications through the Resend HTTP API.

use async_trait::async_trait;
use serde_json::{Value, json};
use vigil_core::contact::ChannelKind;

use crate::{Channel, ChannelError, IncidentContext};

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

pub struct EmailChannel {
  client:   reqwest::Client,
  api_key:  String,
  from:     String,
  endpoint: String,
}

impl EmailChannel {
  /// Returns `None` when no API key is configured; the channel is then left
  /// out of the dispatcher entirely.
  pub fn new(
    client: reqwest::Client,
    api_key: Option<String>,
    from: impl Into<String>,
    endpoint: impl Into<String>,
  ) -> Option<Self> {
    let api_key = api_key.filter(|k| !k.trim().is_empty())?;
    Some(Self { client, api_key, from: from.into(), endpoint: endpoint.into() })
  }
}

/// The Resend request body for one recipient.
pub fn email_body(from: &str, to: &str, ctx: &IncidentContext) -> Value {
  let html = format!(
    "<p>{summary}</p>\
     <p><a href=\"{link}\">Open incident</a></p>\
     <p>Incident ID: {id}</p>",
    summary = html_escape(&ctx.summary()),
    link = html_escape(&ctx.deep_link),
    id = ctx.incident_id,
  );
  json!({
    "from":    from,
    "to":      [to],
    "subject": ctx.title(),
    "html":    html,
  })
}

fn html_escape(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      c => out.push(c),
    }
  }
  out
}

#[async_trait]
impl Channel for EmailChannel {
  fn kind(&self) -> ChannelKind { ChannelKind::Email }

  async fn send(&self, target: &str, ctx: &IncidentContext) -> Result<(), ChannelError> {
    let resp = self
      .client
      .post(&self.endpoint)
      .bearer_auth(&self.api_key)
      .json(&email_body(&self.from, target, ctx))
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
