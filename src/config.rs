//! Configuration Module
//!
//! Handles loading and validating engine configuration from environment variables.
//! A `Config` is built once at startup and shared read-only by every core.

use std::env;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CacheError, Result};

/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Number of cores (and therefore shards) to run
    pub cores: usize,
    /// Per-shard budget for cached value bytes
    pub shard_budget_bytes: usize,
    /// Deadline applied to requests that arrive without one, in milliseconds
    pub default_deadline_ms: u64,
    /// Interval between TTL sweeps, in milliseconds
    pub sweep_interval_ms: u64,
    /// Slots inspected by a sweep before it yields
    pub sweep_batch: usize,
    /// Capacity of each inter-core lane
    pub channel_capacity: usize,
    /// Send attempts on a full lane before reporting overload
    pub send_retries: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `KVCACHE_CORES` - Cores to run (default: available parallelism)
    /// - `KVCACHE_SHARD_BUDGET_BYTES` - Per-shard value budget (default: 64 MiB)
    /// - `KVCACHE_DEFAULT_DEADLINE_MS` - Default request deadline (default: 1000)
    /// - `KVCACHE_SWEEP_INTERVAL_MS` - TTL sweep interval (default: 1000)
    /// - `KVCACHE_SWEEP_BATCH` - Slots per sweep step (default: 128)
    /// - `KVCACHE_CHANNEL_CAPACITY` - Lane capacity (default: scaled down from
    ///   1024 as the core count grows, see `default_lane_capacity`)
    /// - `KVCACHE_SEND_RETRIES` - Full-lane retries (default: 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cores = env_or("KVCACHE_CORES", defaults.cores);
        Self {
            cores,
            shard_budget_bytes: env_or("KVCACHE_SHARD_BUDGET_BYTES", defaults.shard_budget_bytes),
            default_deadline_ms: env_or(
                "KVCACHE_DEFAULT_DEADLINE_MS",
                defaults.default_deadline_ms,
            ),
            sweep_interval_ms: env_or("KVCACHE_SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            sweep_batch: env_or("KVCACHE_SWEEP_BATCH", defaults.sweep_batch),
            channel_capacity: env_or("KVCACHE_CHANNEL_CAPACITY", default_lane_capacity(cores)),
            send_retries: env_or("KVCACHE_SEND_RETRIES", defaults.send_retries),
        }
    }

    /// Rejects configurations no engine can run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.cores, "cores"),
            (self.shard_budget_bytes, "shard_budget_bytes"),
            (self.sweep_batch, "sweep_batch"),
            (self.channel_capacity, "channel_capacity"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(CacheError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }
        if self.default_deadline_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "default_deadline_ms must be non-zero".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "sweep_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            cores,
            shard_budget_bytes: 64 * 1024 * 1024,
            default_deadline_ms: 1000,
            sweep_interval_ms: 1000,
            sweep_batch: 128,
            channel_capacity: default_lane_capacity(cores),
            send_retries: 64,
        }
    }
}

/// Envelope slots the whole mesh may preallocate by default.
const MESH_SLOT_BUDGET: usize = 256 * 1024;

/// Lane capacity used when none is configured.
///
/// The mesh has `cores * cores` lanes, so the per-lane capacity shrinks with
/// the square of the core count, between 16 and 1024 slots.
pub fn default_lane_capacity(cores: usize) -> usize {
    let lanes = cores.max(1).saturating_mul(cores.max(1));
    (MESH_SLOT_BUDGET / lanes).clamp(16, 1024)
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.cores >= 1);
        assert_eq!(config.shard_budget_bytes, 64 * 1024 * 1024);
        assert_eq!(config.default_deadline(), Duration::from_secs(1));
        assert_eq!(config.sweep_batch, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("KVCACHE_SHARD_BUDGET_BYTES");
        env::remove_var("KVCACHE_SEND_RETRIES");

        let config = Config::from_env();
        assert_eq!(config.shard_budget_bytes, 64 * 1024 * 1024);
        assert_eq!(config.send_retries, 64);
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let config = Config {
            cores: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));

        let config = Config {
            channel_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));

        let config = Config {
            default_deadline_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lane_capacity_scales_with_cores() {
        assert_eq!(default_lane_capacity(1), 1024);
        assert_eq!(default_lane_capacity(16), 1024);
        assert_eq!(default_lane_capacity(64), 64);
        assert_eq!(default_lane_capacity(1024), 16);
        // 64 cores stay within the mesh budget
        assert!(64 * 64 * default_lane_capacity(64) <= MESH_SLOT_BUDGET);
    }

    #[test]
    fn test_config_serializes() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("shard_budget_bytes"));
    }
}
