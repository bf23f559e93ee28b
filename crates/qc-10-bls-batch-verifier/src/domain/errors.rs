//! # Verification Errors
//!
//! Error types for the BLS verification pool.
//!
//! Cryptographic invalidity is never an error: an invalid signature resolves
//! to `false`. These types describe failures of the machinery around it.

use thiserror::Error;

/// Errors surfaced to callers of the verification pool.
///
/// `Clone` because one failure (e.g. a broken executor call) rejects every
/// job of the dispatch that carried it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlsPoolError {
    /// Zero signature sets were submitted
    #[error("Empty signature set input")]
    EmptyInput,

    /// The pool is closed or closing
    #[error("Verification pool aborted")]
    Aborted,

    /// The executor call itself failed (not a cryptographic failure)
    #[error("Worker communication error: {0}")]
    WorkerCommunication(String),

    /// Every worker failed to start
    #[error("Worker initialization error: {0}")]
    Initialization(String),

    /// Preparing the crypto inputs of a single job failed
    #[error("Crypto error: {0}")]
    Crypto(String),
}

/// Errors raised by a crypto collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Cannot aggregate an empty list of public keys
    #[error("Cannot aggregate empty public key list")]
    EmptyAggregation,

    /// A point failed to deserialize or validate
    #[error("Invalid point encoding: {0}")]
    InvalidFormat(String),

    /// Inputs to a batch check have mismatched shapes
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),
}

impl From<CryptoError> for BlsPoolError {
    fn from(err: CryptoError) -> Self {
        BlsPoolError::Crypto(err.to_string())
    }
}

/// Errors raised by a compute executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// The execution unit could not be started
    #[error("Executor spawn failed: {0}")]
    SpawnFailed(String),

    /// The execution unit died or dropped the request
    #[error("Executor call failed: {0}")]
    CallFailed(String),

    /// The execution unit did not shut down cleanly
    #[error("Executor termination failed: {0}")]
    TerminateFailed(String),
}

/// Errors from validating a pool configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}
