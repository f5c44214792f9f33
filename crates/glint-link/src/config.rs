//! Link configuration.
//!
//! Timeouts and reconnection policy, loadable from TOML. Absent fields fall
//! back to the protocol defaults so a partial file keeps working across
//! versions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use glint_proto::constants::{ACK_MESSAGE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// Error type for configuration parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML content could not be parsed.
    #[error("failed to parse link config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Timeouts and retry policy for one device link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Transport-level connect timeout in milliseconds; 0 disables the bound.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Timeout for a single message acknowledgment.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Timeout for the device to validate and apply a finished bulk
    /// transfer. On-device validation can take longer than one chunk
    /// round-trip, hence the separate knob.
    #[serde(default = "default_transfer_completion_timeout_ms")]
    pub transfer_completion_timeout_ms: u64,
    /// Reconnection policy applied around `connect`.
    #[serde(default)]
    pub reconnect: BackoffConfig,
}

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Number of retries after the initial attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}
fn default_ack_timeout_ms() -> u64 {
    ACK_MESSAGE_TIMEOUT.as_millis() as u64
}
fn default_transfer_completion_timeout_ms() -> u64 {
    2 * ACK_MESSAGE_TIMEOUT.as_millis() as u64
}
fn default_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            transfer_completion_timeout_ms: default_transfer_completion_timeout_ms(),
            reconnect: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl LinkConfig {
    /// Parses a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn transfer_completion_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_completion_timeout_ms)
    }

    pub fn initial_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.initial_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.ack_timeout(), ACK_MESSAGE_TIMEOUT);
        assert_eq!(cfg.connect_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert!(cfg.transfer_completion_timeout() > cfg.ack_timeout());
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let cfg = LinkConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, LinkConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let cfg = LinkConfig::from_toml_str(
            r#"
ack_timeout_ms = 2500

[reconnect]
retries = 5
"#,
        )
        .unwrap();
        assert_eq!(cfg.ack_timeout_ms, 2500);
        assert_eq!(cfg.reconnect.retries, 5);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.connect_timeout_ms, default_connect_timeout_ms());
        assert_eq!(cfg.reconnect.initial_delay_ms, default_initial_delay_ms());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut cfg = LinkConfig::default();
        cfg.connect_timeout_ms = 3000;
        cfg.reconnect.retries = 1;
        let text = toml::to_string_pretty(&cfg).unwrap();
        let restored = LinkConfig::from_toml_str(&text).unwrap();
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result = LinkConfig::from_toml_str("[[[ not toml");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
