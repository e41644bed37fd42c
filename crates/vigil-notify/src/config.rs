//! Channel configuration and dispatcher construction.
//!
//! Credentials are supplied here and nowhere else; channels never read the
//! environment themselves. A missing section or key leaves that channel
//! disabled rather than failing startup.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
  Dispatcher,
  email::{EmailChannel, RESEND_ENDPOINT},
  push::PushChannel,
  token::{AccessTokenSource, MetadataServerToken, StaticToken},
};

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
  #[serde(default = "default_send_timeout_ms")]
  pub send_timeout_ms: u64,
  #[serde(default = "default_max_in_flight")]
  pub max_in_flight:   usize,
  #[serde(default)]
  pub push:            Option<PushConfig>,
  #[serde(default)]
  pub email:           Option<EmailConfig>,
}

impl Default for NotifyConfig {
  fn default() -> Self {
    Self {
      send_timeout_ms: default_send_timeout_ms(),
      max_in_flight:   default_max_in_flight(),
      push:            None,
      email:           None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
  pub project_id:         String,
  /// A pre-provisioned OAuth access token. Takes precedence over the
  /// metadata server.
  #[serde(default)]
  pub access_token:       Option<String>,
  /// Fetch tokens from a metadata server instead. Set to an empty string to
  /// use the default GCE address.
  #[serde(default)]
  pub metadata_token_url: Option<String>,
  #[serde(default)]
  pub endpoint:           Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
  #[serde(default)]
  pub api_key:  Option<String>,
  #[serde(default = "default_from")]
  pub from:     String,
  #[serde(default = "default_email_endpoint")]
  pub endpoint: String,
}

impl PushConfig {
  /// Where push access tokens come from, or `None` when no credential is
  /// configured at all.
  fn token_source(&self, client: &reqwest::Client) -> Option<Arc<dyn AccessTokenSource>> {
    let token = self.access_token.as_deref().filter(|t| !t.trim().is_empty());
    match (token, &self.metadata_token_url) {
      (Some(token), _) => Some(Arc::new(StaticToken::new(Some(token.to_owned())))),
      (None, Some(url)) => {
        let url = if url.is_empty() { MetadataServerToken::DEFAULT_URL } else { url.as_str() };
        Some(Arc::new(MetadataServerToken::new(client.clone(), url)))
      }
      (None, None) => None,
    }
  }
}

fn default_send_timeout_ms() -> u64 { 10_000 }

fn default_max_in_flight() -> usize { 8 }

fn default_from() -> String { "Location Sharing <onboarding@resend.dev>".to_owned() }

fn default_email_endpoint() -> String { RESEND_ENDPOINT.to_owned() }

impl NotifyConfig {
  pub fn send_timeout(&self) -> Duration { Duration::from_millis(self.send_timeout_ms) }

  /// Build a dispatcher with every channel this configuration enables.
  pub fn build_dispatcher(&self, client: reqwest::Client) -> Dispatcher {
    let mut dispatcher =
      Dispatcher::new(self.send_timeout()).with_max_in_flight(self.max_in_flight);

    match &self.push {
      Some(push) => match push.token_source(&client) {
        Some(tokens) => {
          let mut channel = PushChannel::new(client.clone(), push.project_id.clone(), tokens);
          if let Some(endpoint) = &push.endpoint {
            channel = channel.with_endpoint(endpoint.clone());
          }
          dispatcher = dispatcher.with_channel(Arc::new(channel));
        }
        None => tracing::info!("push channel disabled: no access token or metadata server"),
      },
      None => tracing::info!("push channel disabled: no [notify.push] configuration"),
    }

    let email = self.email.as_ref().and_then(|cfg| {
      EmailChannel::new(client.clone(), cfg.api_key.clone(), cfg.from.clone(), cfg.endpoint.clone())
    });
    match email {
      Some(channel) => dispatcher = dispatcher.with_channel(Arc::new(channel)),
      None => tracing::info!("email channel disabled: no API key configured"),
    }

    dispatcher
  }
}
