//! Lease manager configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! lease_duration_secs = 1800
//! record_events = true
//! watch_interval_ms = 5000
//! max_commit_attempts = 8
//! ```

use crate::error::ConfigError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on lease lifetime (one year)
pub const MAX_LEASE_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Lease manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Lease lifetime in seconds
    pub lease_duration_secs: u64,
    /// Whether to append audit events
    pub record_events: bool,
    /// Lock watcher refresh interval in milliseconds
    pub watch_interval_ms: u64,
    /// Compare-and-swap attempts before giving up on a contended task
    pub max_commit_attempts: u32,
}

impl LeaseConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With lease duration
    #[inline]
    #[must_use]
    pub fn with_lease_duration_secs(mut self, secs: u64) -> Self {
        self.lease_duration_secs = secs;
        self
    }

    /// With audit recording on or off
    #[inline]
    #[must_use]
    pub fn with_record_events(mut self, record: bool) -> Self {
        self.record_events = record;
        self
    }

    /// With watcher interval
    #[inline]
    #[must_use]
    pub fn with_watch_interval_ms(mut self, ms: u64) -> Self {
        self.watch_interval_ms = ms;
        self
    }

    /// With commit attempts
    #[inline]
    #[must_use]
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts;
        self
    }

    /// Lease lifetime
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        let secs = self.lease_duration_secs.min(MAX_LEASE_DURATION_SECS);
        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }

    /// Watcher interval
    #[inline]
    #[must_use]
    pub fn watch_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.watch_interval_ms)
    }

    /// Check values are in range
    ///
    /// # Errors
    /// - `ConfigError::Invalid` for a zero duration, interval or attempt count
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_duration_secs == 0 {
            return Err(ConfigError::Invalid("lease_duration_secs must be > 0".to_string()));
        }
        if self.lease_duration_secs > MAX_LEASE_DURATION_SECS {
            return Err(ConfigError::Invalid(format!(
                "lease_duration_secs must be <= {MAX_LEASE_DURATION_SECS}"
            )));
        }
        if self.watch_interval_ms == 0 {
            return Err(ConfigError::Invalid("watch_interval_ms must be > 0".to_string()));
        }
        if self.max_commit_attempts == 0 {
            return Err(ConfigError::Invalid("max_commit_attempts must be > 0".to_string()));
        }
        Ok(())
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` if validation fails
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - see [`LeaseConfig::from_toml_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: 30 * 60,
            record_events: true,
            watch_interval_ms: 5_000,
            max_commit_attempts: 8,
        }
    }
}
