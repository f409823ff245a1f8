//! # Scheduler configuration.
//!
//! [`SchedulerConfig`] is the read-only settings struct handed to every
//! [`LifecycleManager`](crate::LifecycleManager) at construction. It covers the
//! announcement protocol (grace period, max timeout, backoff), expiry
//! normalization, and runtime sizing (inbox, bus, shutdown grace).
//!
//! Config is sourced in layers:
//! 1. **Defaults**: [`SchedulerConfig::default`]
//! 2. **TOML file**: [`SchedulerConfig::load`] merges the given file if present
//! 3. **Environment**: `EXPIRYVISOR_*` variables override the file; nested keys
//!    use a double underscore (`EXPIRYVISOR_BACKOFF__INITIAL=500ms`)
//!
//! Durations are written as human strings (`"250ms"`, `"30s"`, `"4h"`, `"1d"`).
//!
//! ## Example
//! ```toml
//! grace_period = "4h"
//! max_timeout = "1d"
//! granularity = "10s"
//! expire_grants = true
//!
//! [backoff]
//! initial = "1s"
//! max = "10m"
//! multiplier = 2.0
//! jitter = { kind = "random_factor", factor = 0.2 }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::duration::serde_duration;
use crate::error::ConfigError;
use crate::expiry::Granularity;
use crate::policies::{BackoffPolicy, JitterPolicy};

/// Environment variable prefix recognized by [`SchedulerConfig::load`].
pub const ENV_PREFIX: &str = "EXPIRYVISOR_";

/// Configuration of one lifecycle manager and its subject workers.
///
/// ## Field semantics
/// - `grace_period`: delay between a subject's expiry and the revocation of its grant
/// - `max_timeout`: retry ceiling for one announcement, measured from its first attempt
/// - `backoff`: retry delays after failed publishes
/// - `granularity`: step expiries are rounded up to
/// - `expire_grants`: whether workers forward a revocation after the grace period
/// - `inbox_capacity`: bounded manager inbox (back-pressure for snapshot producers)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `shutdown_grace`: how long [`ManagerHandle::shutdown`](crate::ManagerHandle::shutdown)
///   waits for workers before aborting them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "serde_duration")]
    pub grace_period: Duration,
    #[serde(with = "serde_duration")]
    pub max_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub granularity: Granularity,
    pub expire_grants: bool,
    pub inbox_capacity: usize,
    pub bus_capacity: usize,
    #[serde(with = "serde_duration")]
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    /// Provides a default configuration:
    /// - `grace_period = 4h`
    /// - `max_timeout = 1d`
    /// - `backoff = BackoffPolicy::default()`
    /// - `granularity = 10s`
    /// - `expire_grants = true`
    /// - `inbox_capacity = 256`
    /// - `bus_capacity = 1024`
    /// - `shutdown_grace = 30s`
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(4 * 3_600),
            max_timeout: Duration::from_secs(86_400),
            backoff: BackoffPolicy::default(),
            granularity: Granularity::TEN_SECONDS,
            expire_grants: true,
            inbox_capacity: 256,
            bus_capacity: 1024,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Loads defaults, then the TOML file at `path` (if any), then `EXPIRYVISOR_*`
    /// environment overrides, and validates the result.
    ///
    /// A missing file is not an error; figment treats it as an empty layer.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(SchedulerConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extracts and validates a config from an arbitrary figment.
    ///
    /// Keys missing from the figment fall back to [`SchedulerConfig::default`].
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: SchedulerConfig = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the cross-field invariants the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backoff = &self.backoff;
        if backoff.initial.is_zero() {
            return Err(invalid("backoff.initial", "must be greater than zero"));
        }
        if backoff.max < backoff.initial {
            return Err(invalid(
                "backoff.max",
                format!("must not be below backoff.initial ({:?})", backoff.initial),
            ));
        }
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(invalid(
                "backoff.multiplier",
                format!("must be a finite number >= 1.0, got {}", backoff.multiplier),
            ));
        }
        if let JitterPolicy::RandomFactor { factor } = backoff.jitter {
            if !factor.is_finite() || factor < 0.0 {
                return Err(invalid(
                    "backoff.jitter.factor",
                    format!("must be a finite number >= 0, got {factor}"),
                ));
            }
        }
        if self.max_timeout.is_zero() {
            return Err(invalid("max_timeout", "must be greater than zero"));
        }
        if self.inbox_capacity == 0 {
            return Err(invalid("inbox_capacity", "must be greater than zero"));
        }
        Ok(())
    }

    /// Returns the bus capacity clamped to the minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
