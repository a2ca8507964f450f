//! Centralized Configuration Management
//!
//! Every deadline and back-off used by the session lives here so callers and
//! the CLI configure them in one place. Durations are stored as integer
//! milliseconds or seconds and exposed through accessors.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CrystalysError, CrystalysResult};

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Deadlines for the handshake and correlated queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound for connect through welcome
    pub handshake_timeout_ms: u64,
    /// Upper bound for a single correlated query
    pub query_timeout_ms: u64,
    /// Pause after announcing activity, before the coordinator hello
    pub settle_delay_ms: u64,
    /// Capacity of the lifecycle broadcast channel
    pub lifecycle_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 30_000,
            query_timeout_ms: 10_000,
            settle_delay_ms: 1_000,
            lifecycle_buffer_size: 64,
        }
    }
}

impl SessionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Short deadlines for tests
    pub fn testing() -> Self {
        Self {
            handshake_timeout_ms: 2_000,
            query_timeout_ms: 500,
            settle_delay_ms: 10,
            lifecycle_buffer_size: 64,
        }
    }
}

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Reconnection after a drop from a ready session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Whether a disconnect after `Ready` triggers a new handshake
    pub enabled: bool,
    /// Fixed back-off before each reconnect attempt
    pub delay_ms: u64,
    /// Consecutive failed attempts before giving up (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: 10_000,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn testing() -> Self {
        Self {
            enabled: false,
            delay_ms: 50,
            max_attempts: Some(3),
        }
    }
}

// ----------------------------------------------------------------------------
// Artifact Configuration
// ----------------------------------------------------------------------------

/// Location scheme and transfer limits for replay/metadata artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Host label between `replay{cluster}.` and `.net`. The path always
    /// starts with the fixed Dota 2 application id.
    pub host: String,
    /// Upper bound for one bulk transfer
    pub fetch_timeout_secs: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            host: "valve".to_string(),
            fetch_timeout_secs: 120,
        }
    }
}

impl ArtifactConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
    pub artifacts: ArtifactConfig,
}

impl CoordinatorConfig {
    /// Configuration for tests: short deadlines, reconnect disabled
    pub fn testing() -> Self {
        Self {
            session: SessionConfig::testing(),
            reconnect: ReconnectConfig::testing(),
            artifacts: ArtifactConfig {
                fetch_timeout_secs: 5,
                ..ArtifactConfig::default()
            },
        }
    }

    /// Enable or disable auto-reconnect
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect.enabled = enabled;
        self
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> CrystalysResult<()> {
        if self.session.handshake_timeout_ms == 0 {
            return Err(CrystalysError::config_error(
                "Handshake timeout must be greater than 0",
            ));
        }

        if self.session.query_timeout_ms == 0 {
            return Err(CrystalysError::config_error(
                "Query timeout must be greater than 0",
            ));
        }

        if self.session.settle_delay_ms >= self.session.handshake_timeout_ms {
            return Err(CrystalysError::config_error(
                "Settle delay must be shorter than the handshake timeout",
            ));
        }

        if self.session.lifecycle_buffer_size == 0 {
            return Err(CrystalysError::config_error(
                "Lifecycle buffer size must be greater than 0",
            ));
        }

        if self.reconnect.max_attempts == Some(0) {
            return Err(CrystalysError::config_error(
                "Reconnect max_attempts must be at least 1 when set",
            ));
        }

        if self.artifacts.fetch_timeout_secs == 0 {
            return Err(CrystalysError::config_error(
                "Artifact fetch timeout must be greater than 0",
            ));
        }

        let probe = format!("http://replay1.{}.net/", self.artifacts.host);
        match url::Url::parse(&probe) {
            Ok(parsed) if !self.artifacts.host.is_empty() && parsed.path() == "/" => Ok(()),
            _ => Err(CrystalysError::config_error(format!(
                "Invalid artifact host label: {:?}",
                self.artifacts.host
            ))),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.handshake_timeout(), Duration::from_secs(30));
        assert_eq!(config.session.query_timeout(), Duration::from_secs(10));
        assert_eq!(config.reconnect.delay(), Duration::from_secs(10));
        assert!(!config.reconnect.enabled);

        assert!(CoordinatorConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = CoordinatorConfig::default();
        config.session.query_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.session.settle_delay_ms = config.session.handshake_timeout_ms;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.artifacts.host = "bad/host".to_string();
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.artifacts.host = String::new();
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.reconnect.max_attempts = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auto_reconnect_toggle() {
        let config = CoordinatorConfig::testing().with_auto_reconnect(true);
        assert!(config.reconnect.enabled);
    }
}
