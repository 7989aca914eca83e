//! Configuration for the sleet worker.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::time::Duration;

use sleet_common::config::{MetricsConfig, interpolate};
use sleet_common::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Queue configuration: naming and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name jobs are submitted to.
    #[serde(default = "default_queue_name")]
    pub name: String,
    /// Delivery attempts before a message is dead lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential redelivery backoff, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl QueueConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_queue_name() -> String {
    "job_import_queue".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

/// Worker configuration: concurrency and flush policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent consumption handlers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval between timer-driven flush passes, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Items written per bulk upsert.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Hard cap on any one source buffer; reaching it forces a flush.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    /// Grace period for the final drain on shutdown, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl WorkerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            flush_interval_ms: default_flush_interval_ms(),
            chunk_size: default_chunk_size(),
            max_buffer_size: default_max_buffer_size(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    50
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_chunk_size() -> usize {
    500
}

fn default_max_buffer_size() -> usize {
    50_000
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Fixed-window rate limit on message consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum messages consumed per window.
    #[serde(default = "default_rate_max")]
    pub max: u32,
    /// Window length in milliseconds.
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max: default_rate_max(),
            window_ms: default_rate_window_ms(),
        }
    }
}

fn default_rate_max() -> u32 {
    1000
}

fn default_rate_window_ms() -> u64 {
    1000
}

/// Main configuration for the sleet worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Rate limit configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        // Interpolate environment variables
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        // Parse YAML
        let config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;

        // Validate
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.name.is_empty() {
            return Err(ConfigError::EmptyQueueName);
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.worker.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.worker.max_buffer_size < self.worker.chunk_size {
            return Err(ConfigError::BufferCapTooSmall {
                cap: self.worker.max_buffer_size,
                chunk: self.worker.chunk_size,
            });
        }
        if self.rate_limit.max == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        Ok(())
    }
}
