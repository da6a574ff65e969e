//! Runtime configuration, read from the environment.

use log::warn;
use std::time::Duration;

use fieldbook_core::sync::{DEFAULT_REMOTE_CALL_TIMEOUT_SECS, MIN_PERIODIC_SYNC_INTERVAL_SECS};

use crate::error::{Result, SyncError};

pub const ENV_API_URL: &str = "FIELDBOOK_API_URL";
/// Directory that holds `fieldbook.db`.
pub const ENV_DB_PATH: &str = "FIELDBOOK_DB_PATH";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "FIELDBOOK_REMOTE_TIMEOUT_SECS";
/// Seconds between periodic passes; unset or `0` disables them.
pub const ENV_PERIODIC_SYNC_SECS: &str = "FIELDBOOK_PERIODIC_SYNC_SECS";

pub const DEFAULT_API_URL: &str = "https://localhost:5001";
pub const DEFAULT_DB_PATH: &str = "./fieldbook-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub api_url: String,
    pub db_path: String,
    pub remote_call_timeout: Duration,
    pub periodic_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            remote_call_timeout: Duration::from_secs(DEFAULT_REMOTE_CALL_TIMEOUT_SECS),
            periodic_interval: None,
        }
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| SyncError::Config(format!("{} must be a whole number of seconds: {}", name, e)))
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            config = config.with_api_url(url.trim());
        }
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            config = config.with_db_path(path.trim());
        }
        if let Some(raw) = lookup(ENV_REMOTE_TIMEOUT_SECS) {
            let secs = parse_secs(ENV_REMOTE_TIMEOUT_SECS, &raw)?;
            if secs == 0 {
                return Err(SyncError::Config(format!(
                    "{} must be greater than zero",
                    ENV_REMOTE_TIMEOUT_SECS
                )));
            }
            config = config.with_remote_call_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup(ENV_PERIODIC_SYNC_SECS) {
            let secs = parse_secs(ENV_PERIODIC_SYNC_SECS, &raw)?;
            config = config.with_periodic_interval((secs > 0).then(|| Duration::from_secs(secs)));
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_remote_call_timeout(mut self, timeout: Duration) -> Self {
        self.remote_call_timeout = timeout;
        self
    }

    /// Intervals shorter than the minimum are raised to it.
    pub fn with_periodic_interval(mut self, interval: Option<Duration>) -> Self {
        let min = Duration::from_secs(MIN_PERIODIC_SYNC_INTERVAL_SECS);
        self.periodic_interval = interval.map(|every| {
            if every < min {
                warn!(
                    "[Sync] Periodic interval {:?} is below {:?}; using the minimum",
                    every, min
                );
                min
            } else {
                every
            }
        });
        self
    }
}
