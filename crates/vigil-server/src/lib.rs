//! HTTP server wiring for Vigil.
//!
//! Puts the [`vigil_api`] router behind HTTP Basic auth and runs the
//! periodic escalation sweep alongside it.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::{Router, middleware};
use serde::Deserialize;
use tokio::{
  task::JoinHandle,
  time::{MissedTickBehavior, interval},
};
use tower_http::trace::TraceLayer;
use vigil_core::store::EscalationStore;
use vigil_escalation::{EscalationConfig, SweepScheduler};
use vigil_notify::NotifyConfig;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `VIGIL_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  #[serde(default)]
  pub sweep:              SweepSettings,
  #[serde(default)]
  pub escalation:         EscalationConfig,
  #[serde(default)]
  pub notify:             NotifyConfig,
}

/// The periodic sweep task.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SweepSettings {
  pub interval_secs: u64,
  pub enabled:       bool,
}

impl Default for SweepSettings {
  fn default() -> Self { Self { interval_secs: 60, enabled: true } }
}

impl SweepSettings {
  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs.max(1)) }
}

/// Layer the optional TOML file at `path` under `VIGIL_*` environment
/// variables. Nested keys use `__`, e.g. `VIGIL_ESCALATION__TIER2_AFTER_SECS`.
pub fn load_config(path: &Path) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("VIGIL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()?
    .try_deserialize()
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state for the server router.
pub struct AppState<S> {
  pub scheduler: SweepScheduler<S>,
  pub auth:      Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { scheduler: self.scheduler.clone(), auth: Arc::clone(&self.auth) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server [`Router`]: every API route requires Basic auth.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: EscalationStore + 'static,
{
  vigil_api::api_router(state.scheduler)
    .layer(middleware::from_fn_with_state(state.auth, require_auth))
    .layer(TraceLayer::new_for_http())
}

// ─── Periodic sweep ───────────────────────────────────────────────────────────

/// Spawn the periodic sweep. Returns `None` when disabled.
///
/// A sweep that overruns its interval delays the next tick rather than
/// stacking up missed ones.
pub fn spawn_sweeper<S>(
  scheduler: SweepScheduler<S>,
  settings:  &SweepSettings,
) -> Option<JoinHandle<()>>
where
  S: EscalationStore + 'static,
{
  if !settings.enabled {
    tracing::info!("periodic sweep disabled");
    return None;
  }

  let period = settings.interval();
  tracing::info!(interval_secs = period.as_secs(), "starting periodic sweep");

  Some(tokio::spawn(async move {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let report = scheduler.sweep().await;
      tracing::debug!(?report, "periodic sweep finished");
    }
  }))
}
