//! Access-token sources for channels that authenticate with a service
//! account.
//!
//! A source that cannot produce a token yields
//! [`ChannelError::Unavailable`]; the channel then sends nothing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::ChannelError;

/// Refresh this long before the provider-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait AccessTokenSource: Send + Sync {
  async fn access_token(&self) -> Result<String, ChannelError>;
}

// ─── Static ──────────────────────────────────────────────────────────────────

/// A token provisioned out of band (for example by a sidecar that rotates a
/// config value). `None` means no credentials were configured.
pub struct StaticToken(Option<String>);

impl StaticToken {
  pub fn new(token: Option<String>) -> Self {
    Self(token.filter(|t| !t.trim().is_empty()))
  }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
  async fn access_token(&self) -> Result<String, ChannelError> {
    self
      .0
      .clone()
      .ok_or_else(|| ChannelError::Unavailable("no access token configured".into()))
  }
}

// ─── Metadata server ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
  expires_in:   u64,
}

/// Fetches the default service account's token from a cloud metadata
/// server and caches it until shortly before expiry.
pub struct MetadataServerToken {
  client: reqwest::Client,
  url:    String,
  cached: Mutex<Option<(String, Instant)>>,
}

impl MetadataServerToken {
  pub const DEFAULT_URL: &'static str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

  pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
    Self { client, url: url.into(), cached: Mutex::new(None) }
  }

  async fn fetch(&self) -> Result<TokenResponse, ChannelError> {
    let resp = self
      .client
      .get(&self.url)
      .header("Metadata-Flavor", "Google")
      .send()
      .await
      .map_err(|e| ChannelError::Unavailable(format!("metadata server unreachable: {e}")))?;

    if !resp.status().is_success() {
      return Err(ChannelError::Unavailable(format!(
        "metadata server returned {}",
        resp.status()
      )));
    }
    resp
      .json()
      .await
      .map_err(|e| ChannelError::Unavailable(format!("malformed token response: {e}")))
  }
}

#[async_trait]
impl AccessTokenSource for MetadataServerToken {
  async fn access_token(&self) -> Result<String, ChannelError> {
    let mut cached = self.cached.lock().await;
    if let Some((token, valid_until)) = cached.as_ref()
      && Instant::now() < *valid_until
    {
      return Ok(token.clone());
    }

    let fresh = self.fetch().await?;
    let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
    *cached = Some((fresh.access_token.clone(), Instant::now() + lifetime));
    tracing::debug!(lifetime_secs = lifetime.as_secs(), "refreshed push access token");
    Ok(fresh.access_token)
  }
}
