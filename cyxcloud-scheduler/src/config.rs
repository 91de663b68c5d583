//! Scheduler configuration
//!
//! Configuration loaded from environment variables and command line.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::balance::BalancePolicy;
use crate::balance_region::{BalanceRegionConfig, BALANCE_REGION_TYPE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// JSON cluster snapshot to schedule against
    pub snapshot_path: Option<PathBuf>,

    /// Pause between ticks in milliseconds
    pub tick_interval_ms: u64,

    /// Scheduler types to run, by registry name
    pub schedulers: Vec<String>,

    /// Cooldown applied to a source store with no usable target
    pub store_cache_ttl_secs: u64,

    /// Ceiling of the cooldown as a multiple of the TTL
    pub store_cache_multiplier: u32,

    /// Scales the tolerance margin of the balance check
    pub shift_factor: f64,

    /// Prometheus exporter port, disabled when unset
    pub metrics_port: Option<u16>,

    /// Emit logs as JSON
    pub json_logs: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            tick_interval_ms: 100,
            schedulers: vec![BALANCE_REGION_TYPE.to_string()],
            store_cache_ttl_secs: cyxcloud_core::DEFAULT_STORE_CACHE_TTL_SECS,
            store_cache_multiplier: cyxcloud_core::DEFAULT_MAX_TTL_MULTIPLIER,
            shift_factor: 1.0,
            metrics_port: None,
            json_logs: false,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), v)),
    }
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::trim) {
        None => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no" | "") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(key.to_string(), v.to_string())),
    }
}

impl SchedulerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let snapshot_path = lookup("SCHEDULER_SNAPSHOT_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let tick_interval_ms = parse_var(
            "SCHEDULER_TICK_INTERVAL_MS",
            lookup("SCHEDULER_TICK_INTERVAL_MS"),
            defaults.tick_interval_ms,
        )?;

        let schedulers = match lookup("SCHEDULER_ENABLED") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.schedulers,
        };

        let store_cache_ttl_secs = parse_var(
            "SCHEDULER_STORE_CACHE_TTL_SECS",
            lookup("SCHEDULER_STORE_CACHE_TTL_SECS"),
            defaults.store_cache_ttl_secs,
        )?;

        let store_cache_multiplier = parse_var(
            "SCHEDULER_STORE_CACHE_MULTIPLIER",
            lookup("SCHEDULER_STORE_CACHE_MULTIPLIER"),
            defaults.store_cache_multiplier,
        )?;

        let shift_factor = parse_var(
            "SCHEDULER_SHIFT_FACTOR",
            lookup("SCHEDULER_SHIFT_FACTOR"),
            defaults.shift_factor,
        )?;

        let metrics_port = match lookup("SCHEDULER_METRICS_PORT") {
            Some(v) if !v.trim().is_empty() => Some(parse_var(
                "SCHEDULER_METRICS_PORT",
                Some(v),
                0u16,
            )?),
            _ => None,
        };

        let json_logs = parse_bool("SCHEDULER_JSON_LOGS", lookup("SCHEDULER_JSON_LOGS"))?;

        let config = Self {
            snapshot_path,
            tick_interval_ms,
            schedulers,
            store_cache_ttl_secs,
            store_cache_multiplier,
            shift_factor,
            metrics_port,
            json_logs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_TICK_INTERVAL_MS".to_string(),
                "must be positive".to_string(),
            ));
        }
        if self.store_cache_ttl_secs > cyxcloud_core::MAX_CACHE_TTL.as_secs() {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_STORE_CACHE_TTL_SECS".to_string(),
                format!("must not exceed {}", cyxcloud_core::MAX_CACHE_TTL.as_secs()),
            ));
        }
        if self.store_cache_multiplier == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_STORE_CACHE_MULTIPLIER".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if !self.shift_factor.is_finite() || self.shift_factor < 0.0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_SHIFT_FACTOR".to_string(),
                self.shift_factor.to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot file the driver must load
    pub fn require_snapshot_path(&self) -> Result<&std::path::Path, ConfigError> {
        self.snapshot_path
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("SCHEDULER_SNAPSHOT_PATH".to_string()))
    }

    /// Get tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Get store cooldown TTL as Duration
    pub fn store_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.store_cache_ttl_secs)
    }

    /// Settings for a balance-region scheduler instance
    pub fn balance_region(&self) -> BalanceRegionConfig {
        BalanceRegionConfig {
            store_cache_ttl: self.store_cache_ttl(),
            store_cache_max_multiplier: self.store_cache_multiplier,
            policy: BalancePolicy::new(self.shift_factor),
        }
    }
}
