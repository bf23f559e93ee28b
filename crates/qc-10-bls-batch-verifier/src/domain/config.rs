//! Verification pool configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use qc_10_bls_batch_verifier::BlsPoolConfig;
//!
//! let config = BlsPoolConfig::default()
//!     .with_pool_size(4)
//!     .with_max_buffer_wait(Duration::from_millis(50));
//! config.validate().expect("Valid config");
//! ```

use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Split big signature requests into jobs of at most this many sets.
///
/// Sending a job to a worker costs roughly one signature verification, so 128
/// keeps the overhead well under 1% while still spreading sync batches (~8000
/// sets) across workers.
pub const MAX_SIGNATURE_SETS_PER_JOB: usize = 128;

/// Flush the batch buffer immediately once it holds more than this many sets.
pub const MAX_BUFFERED_SIGS: usize = 32;

/// Longest time a batchable job waits in the buffer.
pub const MAX_BUFFER_WAIT: Duration = Duration::from_millis(100);

/// `can_accept_work` turns false once this many jobs are queued.
pub const MAX_JOBS_CAN_ACCEPT_WORK: usize = 512;

/// Minimum size of a combined batch check inside a worker.
///
/// Batch verifying 16 sets costs about 16+1 single checks. Smaller chunks bound
/// how much must be re-verified when one signature is bad.
pub const BATCHABLE_MIN_PER_CHUNK: usize = 16;

/// Verification pool configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsPoolConfig {
    /// Number of compute executors
    pub pool_size: usize,
    /// Max signature sets per job and per dispatch
    pub max_signature_sets_per_job: usize,
    /// Buffered set count that triggers an early flush
    pub max_buffered_sigs: usize,
    /// Buffer flush deadline
    pub max_buffer_wait: Duration,
    /// Queue length bound for the backpressure signal
    pub max_jobs_can_accept_work: usize,
    /// Minimum chunk size of combined batch checks
    pub batchable_min_per_chunk: usize,
    /// Ignore `verify_on_main_thread` and send everything to the pool
    pub verify_all_in_pool: bool,
}

impl Default for BlsPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_signature_sets_per_job: MAX_SIGNATURE_SETS_PER_JOB,
            max_buffered_sigs: MAX_BUFFERED_SIGS,
            max_buffer_wait: MAX_BUFFER_WAIT,
            max_jobs_can_accept_work: MAX_JOBS_CAN_ACCEPT_WORK,
            batchable_min_per_chunk: BATCHABLE_MIN_PER_CHUNK,
            verify_all_in_pool: false,
        }
    }
}

/// One core stays with the coordinating runtime.
pub fn default_pool_size() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

impl BlsPoolConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_BLS_POOL_SIZE`: Number of workers (default: cpus - 1)
    /// - `QC_BLS_MAX_SETS_PER_JOB`: Sets per job (default: 128)
    /// - `QC_BLS_MAX_BUFFERED_SIGS`: Early flush threshold (default: 32)
    /// - `QC_BLS_MAX_BUFFER_WAIT_MS`: Buffer deadline in ms (default: 100)
    /// - `QC_BLS_MAX_JOBS_CAN_ACCEPT_WORK`: Backpressure bound (default: 512)
    /// - `QC_BLS_BATCHABLE_MIN_PER_CHUNK`: Batch chunk size (default: 16)
    /// - `QC_BLS_VERIFY_ALL_IN_POOL`: Disable the main-thread path (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            pool_size: env_usize("QC_BLS_POOL_SIZE")?.unwrap_or(defaults.pool_size),
            max_signature_sets_per_job: env_usize("QC_BLS_MAX_SETS_PER_JOB")?
                .unwrap_or(defaults.max_signature_sets_per_job),
            max_buffered_sigs: env_usize("QC_BLS_MAX_BUFFERED_SIGS")?
                .unwrap_or(defaults.max_buffered_sigs),
            max_buffer_wait: env_usize("QC_BLS_MAX_BUFFER_WAIT_MS")?
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or(defaults.max_buffer_wait),
            max_jobs_can_accept_work: env_usize("QC_BLS_MAX_JOBS_CAN_ACCEPT_WORK")?
                .unwrap_or(defaults.max_jobs_can_accept_work),
            batchable_min_per_chunk: env_usize("QC_BLS_BATCHABLE_MIN_PER_CHUNK")?
                .unwrap_or(defaults.batchable_min_per_chunk),
            verify_all_in_pool: env::var("QC_BLS_VERIFY_ALL_IN_POOL")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.verify_all_in_pool),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("pool_size", self.pool_size),
            ("max_signature_sets_per_job", self.max_signature_sets_per_job),
            ("max_jobs_can_accept_work", self.max_jobs_can_accept_work),
            ("batchable_min_per_chunk", self.batchable_min_per_chunk),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_max_signature_sets_per_job(mut self, max: usize) -> Self {
        self.max_signature_sets_per_job = max;
        self
    }

    pub fn with_max_buffered_sigs(mut self, max: usize) -> Self {
        self.max_buffered_sigs = max;
        self
    }

    pub fn with_max_buffer_wait(mut self, wait: Duration) -> Self {
        self.max_buffer_wait = wait;
        self
    }

    pub fn with_max_jobs_can_accept_work(mut self, max: usize) -> Self {
        self.max_jobs_can_accept_work = max;
        self
    }

    pub fn with_batchable_min_per_chunk(mut self, min: usize) -> Self {
        self.batchable_min_per_chunk = min;
        self
    }

    pub fn with_verify_all_in_pool(mut self, verify_all_in_pool: bool) -> Self {
        self.verify_all_in_pool = verify_all_in_pool;
        self
    }
}

fn env_usize(var: &'static str) -> Result<Option<usize>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BlsPoolConfig::default();
        assert_eq!(config.max_signature_sets_per_job, 128);
        assert_eq!(config.max_buffered_sigs, 32);
        assert_eq!(config.max_buffer_wait, Duration::from_millis(100));
        assert_eq!(config.max_jobs_can_accept_work, 512);
        assert_eq!(config.batchable_min_per_chunk, 16);
        assert!(config.pool_size >= 1);
        assert!(!config.verify_all_in_pool);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let config = BlsPoolConfig::default().with_pool_size(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero { field: "pool_size" })
        );
    }

    #[test]
    fn test_zero_sets_per_job_rejected() {
        let config = BlsPoolConfig::default().with_max_signature_sets_per_job(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_buffer_threshold_is_allowed() {
        // Every batchable job flushes immediately.
        let config = BlsPoolConfig::default().with_max_buffered_sigs(0);
        assert!(config.validate().is_ok());
    }

    // Single test so parallel tests never observe each other's variables.
    #[test]
    fn test_env_parsing() {
        env::set_var("QC_BLS_MAX_BUFFER_WAIT_MS", "25");
        env::set_var("QC_BLS_VERIFY_ALL_IN_POOL", "true");
        let config = BlsPoolConfig::from_env().unwrap();
        assert_eq!(config.max_buffer_wait, Duration::from_millis(25));
        assert!(config.verify_all_in_pool);

        env::set_var("QC_BLS_MAX_BUFFERED_SIGS", "lots");
        let result = BlsPoolConfig::from_env();
        assert_eq!(
            result,
            Err(ConfigError::InvalidEnv {
                var: "QC_BLS_MAX_BUFFERED_SIGS",
                value: "lots".to_string()
            })
        );

        env::remove_var("QC_BLS_MAX_BUFFER_WAIT_MS");
        env::remove_var("QC_BLS_VERIFY_ALL_IN_POOL");
        env::remove_var("QC_BLS_MAX_BUFFERED_SIGS");
    }
}
