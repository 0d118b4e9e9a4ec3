// crates/core/src/config.rs
//! Job execution configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_QUERY_TIMEOUT_SECS: &str = "GEOQUERY_QUERY_TIMEOUT_SECS";
pub const ENV_STATUS_BUFFER: &str = "GEOQUERY_STATUS_BUFFER";
pub const ENV_STATUS_SEND_TIMEOUT_SECS: &str = "GEOQUERY_STATUS_SEND_TIMEOUT_SECS";
pub const ENV_MAX_CONCURRENT_JOBS: &str = "GEOQUERY_MAX_CONCURRENT_JOBS";
pub const ENV_WRITE_BUFFER_BYTES: &str = "GEOQUERY_WRITE_BUFFER_BYTES";

/// Tunables shared by every job created from one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Absolute deadline for a job, counted from its creation.
    pub query_timeout: Duration,
    /// Capacity of each job's status channel.
    pub status_buffer: usize,
    /// How long a status send may wait for a slow consumer before it is dropped.
    pub status_send_timeout: Duration,
    /// Admission limit on simultaneously live jobs.
    pub max_concurrent_jobs: usize,
    /// Encoded bytes buffered before a chunk is pushed to the blob writer.
    pub write_buffer_bytes: usize,
}

impl Default for JobConfig {
    /// - `query_timeout`: 10 minutes
    /// - `status_buffer`: 16
    /// - `status_send_timeout`: 30 seconds
    /// - `max_concurrent_jobs`: 64
    /// - `write_buffer_bytes`: 64 KiB
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10 * 60),
            status_buffer: 16,
            status_send_timeout: Duration::from_secs(30),
            max_concurrent_jobs: 64,
            write_buffer_bytes: 64 * 1024,
        }
    }
}

impl JobConfig {
    /// Defaults overridden by `GEOQUERY_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            query_timeout: env_parse::<u64>(ENV_QUERY_TIMEOUT_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.query_timeout),
            status_buffer: env_parse(ENV_STATUS_BUFFER).unwrap_or(defaults.status_buffer),
            status_send_timeout: env_parse::<u64>(ENV_STATUS_SEND_TIMEOUT_SECS)
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_send_timeout),
            max_concurrent_jobs: env_parse(ENV_MAX_CONCURRENT_JOBS)
                .unwrap_or(defaults.max_concurrent_jobs),
            write_buffer_bytes: env_parse(ENV_WRITE_BUFFER_BYTES)
                .unwrap_or(defaults.write_buffer_bytes),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "query_timeout",
            });
        }
        if self.status_buffer == 0 {
            return Err(ConfigError::MustBePositive {
                field: "status_buffer",
            });
        }
        if self.status_send_timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "status_send_timeout",
            });
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_concurrent_jobs",
            });
        }
        if self.write_buffer_bytes == 0 {
            return Err(ConfigError::MustBePositive {
                field: "write_buffer_bytes",
            });
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}
