//! Client configuration
//!
//! Settings can be loaded from a JSON file and are overridden field by field by
//! the CLI. The API token is never printed by the `Debug` implementation.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Daily metrics endpoint
pub const DAILY_METRICS_ENDPOINT: &str = "https://partner.ultrahuman.com/api/v1/partner/daily_metrics";

/// Default refresh interval (15 minutes)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15 * 60;

/// Default request timeout for refresh cycles
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Request timeout used when validating a token
pub const VALIDATION_TIMEOUT_SECS: u64 = 10;

fn default_endpoint() -> String {
    DAILY_METRICS_ENDPOINT.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Connection and polling settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Daily metrics endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Partner API token, sent verbatim in the `Authorization` header
    #[serde(default)]
    pub api_token: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Refresh interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Identifier entity unique ids are built from
    #[serde(default)]
    pub entry_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_token: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            entry_id: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("entry_id", &self.entry_id)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with defaults and the given token
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            ..Default::default()
        }
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        serde_json::from_str(json).map_err(|e| ComputeError::ConfigError(e.to_string()))
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ComputeError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Check that the configuration can be used to poll
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.api_token.trim().is_empty() {
            return Err(ComputeError::ConfigError("API token is empty".to_string()));
        }
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(ComputeError::ConfigError(format!(
                "Endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ComputeError::ConfigError("Timeout must be positive".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ComputeError::ConfigError(
                "Poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Entry id, generating and remembering a random one when unset
    pub fn ensure_entry_id(&mut self) -> &str {
        self.entry_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .as_str()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = ClientConfig::from_json(r#"{"api_token": "abc"}"#).unwrap();
        assert_eq!(config.endpoint, DAILY_METRICS_ENDPOINT);
        assert_eq!(config.poll_interval(), Duration::from_secs(900));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(ClientConfig::default().validate().is_err());

        let mut config = ClientConfig::new("token");
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new("token");
        config.endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig::new("super-secret");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_entry_id_is_stable_once_generated() {
        let mut config = ClientConfig::new("token");
        let first = config.ensure_entry_id().to_string();
        assert_eq!(config.ensure_entry_id(), first);

        let mut fixed = ClientConfig::new("token");
        fixed.entry_id = Some("home".to_string());
        assert_eq!(fixed.ensure_entry_id(), "home");
    }

    #[test]
    fn test_invalid_json() {
        assert!(ClientConfig::from_json("{").is_err());
    }
}
