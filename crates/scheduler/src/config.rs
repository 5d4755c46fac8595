//! Scheduler configuration.
//!
//! Parsed from TOML with `URTEIL_*` environment variable overrides. Every
//! field has a default, so `SchedulerConfig::default()` is a working
//! configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Tunables for the scheduler core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on simultaneous evaluator calls.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Minimum adaptive batch size.
    #[serde(default = "default_batch_size_floor")]
    pub batch_size_floor: usize,

    /// Maximum adaptive batch size.
    #[serde(default = "default_batch_size_ceiling")]
    pub batch_size_ceiling: usize,

    /// Requests with a deadline below this bypass batching entirely.
    #[serde(default = "default_critical_deadline_threshold_ms")]
    pub critical_deadline_threshold_ms: u64,

    /// How long a partial batch may linger before it is flushed anyway.
    #[serde(default = "default_batch_max_wait_ms")]
    pub batch_max_wait_ms: u64,

    /// Result cache entry lifetime. Expired entries are pruned lazily on
    /// the next lookup.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Dispatcher housekeeping tick (drives time-based batch flushes).
    #[serde(default = "default_dispatch_tick_ms")]
    pub dispatch_tick_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_batch_size_floor() -> usize {
    1
}

fn default_batch_size_ceiling() -> usize {
    16
}

fn default_critical_deadline_threshold_ms() -> u64 {
    250
}

fn default_batch_max_wait_ms() -> u64 {
    50
}

/// 7 days, matching the upstream scoring service's result cache.
fn default_cache_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_dispatch_tick_ms() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            batch_size_floor: default_batch_size_floor(),
            batch_size_ceiling: default_batch_size_ceiling(),
            critical_deadline_threshold_ms: default_critical_deadline_threshold_ms(),
            batch_max_wait_ms: default_batch_max_wait_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            dispatch_tick_ms: default_dispatch_tick_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let mut config: Self =
            toml::from_str(toml_str).map_err(|e| SchedulerError::ConfigParse(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SchedulerError::ConfigIo(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Apply environment variable overrides.
    ///
    /// Convention: `URTEIL_KEY` overrides the field `key`, e.g.
    /// `URTEIL_MAX_CONCURRENCY=8`.
    pub fn apply_env_overrides(&mut self) {
        override_usize("URTEIL_MAX_CONCURRENCY", &mut self.max_concurrency);
        override_usize("URTEIL_BATCH_SIZE_FLOOR", &mut self.batch_size_floor);
        override_usize("URTEIL_BATCH_SIZE_CEILING", &mut self.batch_size_ceiling);
        override_u64(
            "URTEIL_CRITICAL_DEADLINE_THRESHOLD_MS",
            &mut self.critical_deadline_threshold_ms,
        );
        override_u64("URTEIL_BATCH_MAX_WAIT_MS", &mut self.batch_max_wait_ms);
        override_u64("URTEIL_CACHE_TTL_SECS", &mut self.cache_ttl_secs);
        override_u64("URTEIL_DISPATCH_TICK_MS", &mut self.dispatch_tick_ms);
    }

    /// Check the config for contradictions.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_concurrency == 0 {
            return Err(SchedulerError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.batch_size_floor == 0 {
            return Err(SchedulerError::Config(
                "batch_size_floor must be at least 1".into(),
            ));
        }
        if self.batch_size_ceiling < self.batch_size_floor {
            return Err(SchedulerError::Config(format!(
                "batch_size_ceiling ({}) is below batch_size_floor ({})",
                self.batch_size_ceiling, self.batch_size_floor
            )));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn batch_max_wait(&self) -> Duration {
        Duration::from_millis(self.batch_max_wait_ms)
    }

    pub fn dispatch_tick(&self) -> Duration {
        Duration::from_millis(self.dispatch_tick_ms.max(1))
    }
}

fn override_usize(key: &str, field: &mut usize) {
    if let Ok(v) = std::env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}

fn override_u64(key: &str, field: &mut u64) {
    if let Ok(v) = std::env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}
