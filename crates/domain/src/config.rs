//! Configuration management

use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_DB_PATH, DEFAULT_LEASE_EXPIRATION_SECS,
    DEFAULT_POOL_SIZE,
};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub store: StoreSettings,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: DEFAULT_DB_PATH.to_string(), pool_size: DEFAULT_POOL_SIZE }
    }
}

/// Which log store backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

crate::impl_domain_status_conversions!(StoreBackend {
    Memory => "memory",
    Sqlite => "sqlite",
});

/// Log store settings as they appear in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Lease holder identity; the host name is used when unset.
    pub machine_id: Option<String>,
    pub default_lease_seconds: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            machine_id: None,
            default_lease_seconds: DEFAULT_LEASE_EXPIRATION_SECS,
        }
    }
}

impl StoreSettings {
    /// Resolve into a [`StoreConfig`], falling back to `default_machine_id`.
    pub fn to_store_config(&self, default_machine_id: impl Into<String>) -> StoreConfig {
        let machine_id = self.machine_id.clone().unwrap_or_else(|| default_machine_id.into());
        StoreConfig::new(machine_id)
            .with_default_lease_expiration(seconds_to_duration(self.default_lease_seconds))
    }
}

/// Runtime configuration every log store receives at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub machine_id: String,
    pub default_lease_expiration: Duration,
}

impl StoreConfig {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            default_lease_expiration: seconds_to_duration(DEFAULT_LEASE_EXPIRATION_SECS),
        }
    }

    #[must_use]
    pub const fn with_default_lease_expiration(mut self, expiration: Duration) -> Self {
        self.default_lease_expiration = expiration;
        self
    }
}

/// Periodic scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub startup_delay_seconds: u64,
    pub check_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_delay_seconds: 0,
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECS,
        }
    }
}

impl SchedulerConfig {
    pub const fn startup_delay(&self) -> StdDuration {
        StdDuration::from_secs(self.startup_delay_seconds)
    }

    pub const fn check_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.check_interval_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

fn seconds_to_duration(seconds: u64) -> Duration {
    Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX / 1_000))
}
