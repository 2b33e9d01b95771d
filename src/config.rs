use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// What the supervising loop does with a record that fails protocol or
/// payload validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Drop the offending record, release its resources, keep running.
    Discard,
    /// Abort the processing cycle.
    Fatal,
}

/// Pipeline configuration, deserialized from a JSON blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run identifier stamped on every record; fragments from another run
    /// are dropped at ingest.
    pub run_id: u32,
    /// Seed source plus peer sources contributing to each record.
    pub expected_sources: u16,
    /// Size of the bounded resource-id pool.
    pub resource_pool: u16,
    /// Operations per outbound allocator batch.
    pub packing: usize,
    /// Age bound for a partially filled allocator batch.
    pub flush_age_ms: u64,
    /// Capacity of the fragment input ring.
    pub input_ring: usize,
    /// Capacity of the completed-record ring.
    pub completion_ring: usize,
    /// Sleep applied when a poll loop finds its ring empty or full.
    pub poll_sleep_us: u64,
    /// Recycle ids on release instead of round-tripping the free list.
    pub recycle_on_release: bool,
    pub corruption_policy: CorruptionPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_id: 1,
            expected_sources: 4,
            resource_pool: 64,
            packing: 8,
            flush_age_ms: 200,
            input_ring: 1024,
            completion_ring: 256,
            poll_sleep_us: 100,
            recycle_on_release: false,
            corruption_policy: CorruptionPolicy::Fatal,
        }
    }
}

impl PipelineConfig {
    /// Age bound as a [`Duration`].
    pub fn flush_age(&self) -> Duration {
        Duration::from_millis(self.flush_age_ms)
    }

    /// Poll-loop sleep as a [`Duration`].
    pub fn poll_sleep(&self) -> Duration {
        Duration::from_micros(self.poll_sleep_us)
    }

    /// Rejects configurations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expected_sources == 0 {
            return Err(ConfigError::NoSources);
        }
        if self.resource_pool == 0 {
            return Err(ConfigError::EmptyPool);
        }
        if self.packing == 0 {
            return Err(ConfigError::ZeroPacking);
        }
        if self.input_ring == 0 {
            return Err(ConfigError::ZeroRing { ring: "input" });
        }
        if self.completion_ring == 0 {
            return Err(ConfigError::ZeroRing { ring: "completion" });
        }
        Ok(())
    }
}

/// Configurations rejected before the pipeline starts.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("expected_sources must be at least 1 (the seed source)")]
    NoSources,
    #[error("resource_pool must hold at least one id")]
    EmptyPool,
    #[error("packing must be at least one operation")]
    ZeroPacking,
    #[error("{ring} ring capacity must be > 0")]
    ZeroRing { ring: &'static str },
}

/// Loads and validates a config file.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<PipelineConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(config)
}
