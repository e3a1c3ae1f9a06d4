use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the batch write coordinator.
///
/// The defaults keep a batch below the usual 500 writes per atomic commit limit of document
/// stores and allow a few tens of commits in flight.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WriteBatchConfig {
    /// Maximum number of operations recorded in one batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Number of batches kept open at the same time.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Maximum number of batch commits in flight.
    #[serde(default = "default_max_concurrent_commits")]
    pub max_concurrent_commits: usize,
    /// Lower bound for the commit ceiling when the coordinator throttles itself.
    #[serde(default = "default_min_concurrent_commits")]
    pub min_concurrent_commits: usize,
    /// Number of batches committed together by one flush chunk.
    #[serde(default = "default_flush_fan_out")]
    pub flush_fan_out: usize,
    /// Pause between two flush chunks, in milliseconds.
    #[serde(default = "default_flush_chunk_pause_ms")]
    pub flush_chunk_pause_ms: u64,
    /// Timeout of a single commit attempt, in milliseconds.
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
    /// Number of retries after the first commit attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay of the exponential backoff, in milliseconds.
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
}

impl WriteBatchConfig {
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;
    pub const DEFAULT_POOL_SIZE: usize = 10;
    pub const DEFAULT_MAX_CONCURRENT_COMMITS: usize = 20;
    pub const DEFAULT_MIN_CONCURRENT_COMMITS: usize = 2;
    pub const DEFAULT_FLUSH_FAN_OUT: usize = 5;
    pub const DEFAULT_FLUSH_CHUNK_PAUSE_MS: u64 = 100;
    pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 30_000;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 1_000;

    /// Returns the pause between flush chunks.
    pub fn flush_chunk_pause(&self) -> Duration {
        Duration::from_millis(self.flush_chunk_pause_ms)
    }

    /// Returns the timeout of one commit attempt.
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    /// Returns the base delay of the exponential backoff.
    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    /// Validates the batch settings.
    ///
    /// Sizes and ceilings must be non-zero and the throttle floor cannot exceed the ceiling.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let non_zero = [
            ("batch.max_batch_size", self.max_batch_size),
            ("batch.pool_size", self.pool_size),
            ("batch.max_concurrent_commits", self.max_concurrent_commits),
            ("batch.min_concurrent_commits", self.min_concurrent_commits),
            ("batch.flush_fan_out", self.flush_fan_out),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be greater than 0".to_string(),
                });
            }
        }

        if self.min_concurrent_commits > self.max_concurrent_commits {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.min_concurrent_commits".to_string(),
                constraint: "must not exceed `batch.max_concurrent_commits`".to_string(),
            });
        }

        if self.commit_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.commit_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for WriteBatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            pool_size: default_pool_size(),
            max_concurrent_commits: default_max_concurrent_commits(),
            min_concurrent_commits: default_min_concurrent_commits(),
            flush_fan_out: default_flush_fan_out(),
            flush_chunk_pause_ms: default_flush_chunk_pause_ms(),
            commit_timeout_ms: default_commit_timeout_ms(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
        }
    }
}

fn default_max_batch_size() -> usize {
    WriteBatchConfig::DEFAULT_MAX_BATCH_SIZE
}

fn default_pool_size() -> usize {
    WriteBatchConfig::DEFAULT_POOL_SIZE
}

fn default_max_concurrent_commits() -> usize {
    WriteBatchConfig::DEFAULT_MAX_CONCURRENT_COMMITS
}

fn default_min_concurrent_commits() -> usize {
    WriteBatchConfig::DEFAULT_MIN_CONCURRENT_COMMITS
}

fn default_flush_fan_out() -> usize {
    WriteBatchConfig::DEFAULT_FLUSH_FAN_OUT
}

fn default_flush_chunk_pause_ms() -> u64 {
    WriteBatchConfig::DEFAULT_FLUSH_CHUNK_PAUSE_MS
}

fn default_commit_timeout_ms() -> u64 {
    WriteBatchConfig::DEFAULT_COMMIT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    WriteBatchConfig::DEFAULT_MAX_RETRIES
}

fn default_base_retry_delay_ms() -> u64 {
    WriteBatchConfig::DEFAULT_BASE_RETRY_DELAY_MS
}
