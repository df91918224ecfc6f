//! # Engine Configuration
//!
//! Plain-struct configuration with defaults and environment overrides
//! (`TASKFORGE_*`). Only scheduling knobs live here; per-type behavior
//! (retries, timeouts, archiving) belongs to the task type records.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker loop tick interval
    pub poll_interval_ms: u64,
    /// Number of concurrent worker loops spawned by the pool
    pub worker_count: usize,
    /// Interval between hung-task sweeps
    pub hung_sweep_interval_ms: u64,
    /// Interval between archive sweeps
    pub archive_sweep_interval_ms: u64,
    /// Terminal tasks older than this many days become archive candidates;
    /// `0` archives immediately
    pub retention_days: i64,
    /// Maximum tasks relocated per archive sweep
    pub archive_batch_size: usize,
    /// Capacity of the in-process event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            worker_count: 2,
            hung_sweep_interval_ms: 60_000,
            archive_sweep_interval_ms: 3_600_000,
            retention_days: 30,
            archive_batch_size: 100,
            event_channel_capacity: 1000,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("TASKFORGE_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse(&value, "poll_interval_ms")?;
        }
        if let Ok(value) = std::env::var("TASKFORGE_WORKER_COUNT") {
            config.worker_count = parse(&value, "worker_count")?;
        }
        if let Ok(value) = std::env::var("TASKFORGE_HUNG_SWEEP_INTERVAL_MS") {
            config.hung_sweep_interval_ms = parse(&value, "hung_sweep_interval_ms")?;
        }
        if let Ok(value) = std::env::var("TASKFORGE_ARCHIVE_SWEEP_INTERVAL_MS") {
            config.archive_sweep_interval_ms = parse(&value, "archive_sweep_interval_ms")?;
        }
        if let Ok(value) = std::env::var("TASKFORGE_RETENTION_DAYS") {
            config.retention_days = parse(&value, "retention_days")?;
        }
        if let Ok(value) = std::env::var("TASKFORGE_ARCHIVE_BATCH_SIZE") {
            config.archive_batch_size = parse(&value, "archive_batch_size")?;
        }
        if let Ok(value) = std::env::var("TASKFORGE_EVENT_CHANNEL_CAPACITY") {
            config.event_channel_capacity = parse(&value, "event_channel_capacity")?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(value: &str, field: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| EngineError::InvalidArgument(format!("invalid {field}: {e}")))
}
