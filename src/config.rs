//! Client configuration, loaded from a TOML file.
//!
//! A missing file yields the defaults; a present but malformed file is an
//! error so typos never silently fall back.

use crate::driver::StallPolicy;
use crate::error::ConfigError;
use crate::run::DEFAULT_RAW_EVENT_CAP;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the agent backend.
    pub base_url: String,
    /// Stall window in seconds; absent disables stall detection.
    pub stall_timeout_secs: Option<u64>,
    /// Retained raw events per consolidated log entry.
    pub raw_event_cap: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stall_timeout_secs: None,
            raw_event_cap: DEFAULT_RAW_EVENT_CAP,
        }
    }
}

impl ClientConfig {
    pub fn stall_policy(&self) -> StallPolicy {
        match self.stall_timeout_secs {
            Some(secs) => StallPolicy::after(Duration::from_secs(secs)),
            None => StallPolicy::none(),
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.raw_event_cap == 0 {
            return Err(ConfigError::Invalid(
                "raw_event_cap must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}

/// Default config file location under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("soliplex").join("config.toml"))
}

/// Load configuration from `path`, or the default location when `None`.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return ClientConfig::default().validate(),
        },
    };
    if !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return ClientConfig::default().validate();
    }
    let raw = std::fs::read_to_string(&path)?;
    parse_config(&raw)
}

fn parse_config(raw: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(raw)?;
    config.validate()
}
