//! # configs
//!
//! Layered settings: built-in defaults, then an optional file named by
//! `FORUM_CONFIG` (default `config/forum`, any format `config` can read),
//! then `FORUM__<SECTION>__<KEY>` environment variables. A `.env` file is
//! loaded into the environment first when present.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use domains::ForumPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE_VAR: &str = "FORUM_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config/forum";
pub const ENV_PREFIX: &str = "FORUM";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the store delivers change notifications to subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    /// The store pushes every committed change.
    #[default]
    Push,
    /// Subscriptions re-read their path on an interval and diff.
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Buffered change notifications before slow subscribers lag.
    pub channel_capacity: usize,
    pub subscriptions: SubscriptionMode,
    pub poll_interval_ms: u64,
    /// JSON file the store is loaded from and saved to, if any.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            subscriptions: SubscriptionMode::Push,
            poll_interval_ms: 250,
            snapshot_path: None,
        }
    }
}

impl StoreSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub forum: ForumPolicy,
    pub store: StoreSettings,
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Loads `.env`, the config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let file = std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let builder = Config::builder().add_source(File::with_name(&file).required(false));
        Self::build(builder.add_source(environment(None)))
    }

    /// Layers TOML text and an explicit variable map over the defaults,
    /// without touching the process environment.
    pub fn from_parts(toml: &str, vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(environment(Some(vars)));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        debug!(?settings, "configuration loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.forum
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.store.channel_capacity == 0 {
            return Err(ConfigError::Invalid("store.channel_capacity must be positive".into()));
        }
        if self.store.subscriptions == SubscriptionMode::Poll && self.store.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("store.poll_interval_ms must be positive".into()));
        }
        if self.telemetry.level.trim().is_empty() {
            return Err(ConfigError::Invalid("telemetry.level must not be empty".into()));
        }
        Ok(())
    }
}

fn environment(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .source(vars)
}
