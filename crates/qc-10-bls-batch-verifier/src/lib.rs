//! # BLS Batch Verification Subsystem (QC-10)
//!
//! Concurrent batching engine for BLS12-381 signature verification on the
//! beacon node. Gossip validation, block import and sync submit signature
//! sets; the pool verifies them on a fixed set of workers, batching where it
//! pays off.
//!
//! ## Architecture
//!
//! This subsystem follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): jobs, queue, batch buffer, chunking, the
//!   batch-retry coordinator and the blst primitives
//! - **Ports Layer** (`ports/`): [`BlsVerifier`] in, [`BlsCrypto`] and
//!   [`ComputeExecutor`] out
//! - **Adapters Layer** (`adapters/`): blocking-pool and rayon executors
//! - **Service Layer** (`service.rs`): [`BlsWorkerPool`], [`InlineBlsVerifier`]
//!
//! ## Guarantees
//!
//! - `true` only if every constituent signature is valid
//! - One invalid signature never flips the result of another request
//! - A batchable request waits at most `max_buffer_wait` before dispatch
//! - Every request resolves exactly once, also when the pool closes
//!
//! ## Example
//!
//! ```rust,ignore
//! use qc_10_bls_batch_verifier::{BlsPoolConfig, BlsVerifier, BlsWorkerPool, VerifyOpts};
//!
//! let pool = BlsWorkerPool::with_blst(BlsPoolConfig::from_env()?, None)?;
//! let valid = pool
//!     .verify_signature_sets(sets, VerifyOpts::batchable())
//!     .await?;
//! ```

pub mod adapters;
mod dispatcher;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::executor::{BlockingExecutor, RayonExecutor, RayonWorker};
pub use domain::bls::{
    aggregate_bls_public_keys, verify_bls, verify_bls_batch, verify_bls_same_message, BlstCrypto,
    DST,
};
pub use domain::chunk::{chunkify_maximize_chunk_size, chunkify_min_chunk_size};
pub use domain::config::BlsPoolConfig;
pub use domain::entities::{
    BlsPublicKey, BlsSignature, PublicKeySignaturePair, ResolvedSignatureSet, SetPublicKey,
    SignatureSet, SigningRoot, VerifyOpts,
};
pub use domain::errors::{BlsPoolError, ConfigError, CryptoError, ExecutorError};
pub use domain::work::{run_work_requests, WorkRequest, WorkResult};
pub use ports::inbound::BlsVerifier;
pub use ports::outbound::{BlsCrypto, ComputeExecutor};
pub use service::{BlsWorkerPool, InlineBlsVerifier};
