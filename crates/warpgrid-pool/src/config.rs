//! Pool configuration.
//!
//! A single explicit struct holds every recognized option. It can be
//! built in code (`..PoolConfig::default()`) or loaded from TOML, where
//! durations are written as `"500ms"`, `"5s"`, `"2m"` or a bare number of
//! seconds. [`PoolConfig::validate`] runs once at build time.

use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use warpgrid_autoscale::ScaleThresholds;

use crate::error::{PoolError, PoolResult};

/// Which window counter a failed health check increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthFailureCounter {
    #[default]
    Overload,
    Error,
}

/// Autoscale control-loop settings. Absent means fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoscaleConfig {
    /// Sampling window length (timer period).
    #[serde(deserialize_with = "duration")]
    pub interval: Duration,
    /// Consecutive windows a proposal must repeat before it is applied.
    pub sample_count: u32,
    pub thresholds: ScaleThresholds,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            sample_count: 1,
            thresholds: ScaleThresholds::default(),
        }
    }
}

/// Configuration for a single pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Pool alias, used in logs, events and errors.
    pub name: String,
    /// Initial capacity.
    pub capacity: usize,
    pub min_capacity: usize,
    pub max_capacity: usize,
    /// Default bound for `Pool::acquire`.
    #[serde(deserialize_with = "duration")]
    pub acquire_timeout: Duration,
    /// Bound for a single factory attempt.
    #[serde(deserialize_with = "duration")]
    pub factory_timeout: Duration,
    /// Extra factory attempts after the first failure.
    pub factory_idle_retry: u32,
    /// First retry delay; doubles per attempt up to `factory_timeout`.
    #[serde(deserialize_with = "duration")]
    pub factory_retry_backoff: Duration,
    #[serde(deserialize_with = "duration")]
    pub health_check_timeout: Duration,
    pub health_failure: HealthFailureCounter,
    pub autoscale: Option<AutoscaleConfig>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            capacity: 10,
            min_capacity: 1,
            max_capacity: 10,
            acquire_timeout: Duration::from_secs(30),
            factory_timeout: Duration::from_secs(10),
            factory_idle_retry: 3,
            factory_retry_backoff: Duration::from_millis(100),
            health_check_timeout: Duration::from_secs(5),
            health_failure: HealthFailureCounter::default(),
            autoscale: None,
        }
    }
}

impl PoolConfig {
    /// Default configuration with the given alias.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: PoolConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file and validate it.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check bounds and timeouts. Every violation is fatal.
    pub fn validate(&self) -> PoolResult<()> {
        if self.name.trim().is_empty() {
            return Err(PoolError::config("pool name is required"));
        }
        if self.min_capacity == 0 {
            return Err(PoolError::config(format!(
                "pool '{}': min_capacity must be at least 1",
                self.name
            )));
        }
        if self.min_capacity > self.capacity || self.capacity > self.max_capacity {
            return Err(PoolError::config(format!(
                "pool '{}': capacity bounds must satisfy 1 <= min ({}) <= capacity ({}) <= max ({})",
                self.name, self.min_capacity, self.capacity, self.max_capacity
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::config(format!(
                "pool '{}': acquire_timeout must be greater than zero",
                self.name
            )));
        }
        if self.factory_timeout.is_zero() {
            return Err(PoolError::config(format!(
                "pool '{}': factory_timeout must be greater than zero",
                self.name
            )));
        }
        if let Some(autoscale) = &self.autoscale {
            if autoscale.interval.is_zero() {
                return Err(PoolError::config(format!(
                    "pool '{}': autoscale interval must be greater than zero",
                    self.name
                )));
            }
            if autoscale.sample_count == 0 {
                return Err(PoolError::config(format!(
                    "pool '{}': autoscale sample_count must be at least 1",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Text(String),
    Secs(u64),
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Secs(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid duration '{text}'"))),
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.trim().parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
