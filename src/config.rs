/// Runtime configuration.
///
/// Loaded from an optional TOML file and then overridden by environment
/// variables, so deployments can ship a checked-in config and still tweak
/// a single value per environment. A `.env` file is honored when present
/// (via `dotenvy`); all `env::var` access is consolidated here.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::CanonicalCode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Strongly typed service configuration. Immutable after loading.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the monitoring data service.
    pub base_url: String,

    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,

    /// Quiet period for refresh debouncing, in milliseconds.
    pub debounce_ms: u64,

    /// Variable codes excluded from the merged alert feed. Defaults to the
    /// comfort variables so the feed stays pollutant-only.
    pub alert_exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
            debounce_ms: 450,
            alert_exclude: vec![
                "TEMPERATURE".to_string(),
                "HUMIDITY".to_string(),
                "WINDSPEED".to_string(),
            ],
        }
    }
}

impl Config {
    /// Loads configuration: defaults, then the TOML file if given, then
    /// environment overrides. `.env` is read first so variables defined
    /// there behave like real environment variables.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("AQMON_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(raw) = env::var("AQMON_TIMEOUT_SECS") {
            self.timeout_secs = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "AQMON_TIMEOUT_SECS",
                value: raw,
            })?;
        }
        if let Ok(raw) = env::var("AQMON_DEBOUNCE_MS") {
            self.debounce_ms = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "AQMON_DEBOUNCE_MS",
                value: raw,
            })?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The exclusion list as canonical codes. Entries are canonicalized,
    /// so `"PM 2,5"` and `"PM25"` configure the same exclusion.
    pub fn alert_exclude_codes(&self) -> Vec<CanonicalCode> {
        self.alert_exclude
            .iter()
            .map(|name| crate::registry::code_for_name(name))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
