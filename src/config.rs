use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Local};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::net::{PendingPolicy, DEFAULT_SCHEDULE_SECS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read client config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("no server URL configured")]
    MissingUrl,
    #[error("UTC offset of {0} minutes is out of range")]
    InvalidOffset(i32),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: Option<String>,
    pub root_id: String,
    pub online_bar_id: String,
    /// Mirror every server id into an `id="o<id>"` attribute.
    pub add_node_ids: bool,
    pub backoff_seconds: Vec<u64>,
    pub pending_sends: PendingPolicy,
    /// Locality shift for date/time values; the system offset when unset.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            root_id: "display".to_string(),
            online_bar_id: "online-bar".to_string(),
            add_node_ids: false,
            backoff_seconds: DEFAULT_SCHEDULE_SECS.to_vec(),
            pending_sends: PendingPolicy::default(),
            utc_offset_minutes: None,
        }
    }
}

impl ClientConfig {
    /// Load from a YAML file; a missing path or file yields the defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)?
            }
            _ => Self::default(),
        };
        config.utc_offset()?;
        Ok(config)
    }

    /// The server URL, preferring `override_url` over the configured one.
    pub fn server_url(&self, override_url: Option<&str>) -> Result<Url, ConfigError> {
        let raw = override_url
            .or(self.url.as_deref())
            .ok_or(ConfigError::MissingUrl)?;
        Ok(Url::parse(raw)?)
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.backoff_seconds
            .iter()
            .copied()
            .map(Duration::from_secs)
            .collect()
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        match self.utc_offset_minutes {
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or(ConfigError::InvalidOffset(minutes)),
            None => Ok(*Local::now().offset()),
        }
    }
}
