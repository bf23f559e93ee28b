//! # Outbound Ports (Driven Ports / SPI)
//!
//! Traits that define dependencies this subsystem needs:
//! - [`BlsCrypto`]: the pairing mathematics
//! - [`ComputeExecutor`]: where verification work actually runs

use crate::domain::entities::{BlsPublicKey, PublicKeySignaturePair, ResolvedSignatureSet, SigningRoot};
use crate::domain::errors::{CryptoError, ExecutorError};
use crate::domain::work::{WorkRequest, WorkResult};

/// BLS verification primitives.
///
/// `Ok(false)` means cryptographically invalid. `Err` is reserved for inputs
/// that cannot be checked at all; the pool treats a failed batch check the
/// same as a `false` one and re-verifies.
pub trait BlsCrypto: Send + Sync + 'static {
    /// Verify one signature set.
    fn verify_single(&self, set: &ResolvedSignatureSet) -> Result<bool, CryptoError>;

    /// Verify many sets at once. True iff ALL are valid, no partial information.
    fn verify_batch(&self, sets: &[ResolvedSignatureSet]) -> Result<bool, CryptoError>;

    /// Aggregate participant keys into one key.
    fn aggregate_public_keys(&self, keys: &[BlsPublicKey]) -> Result<BlsPublicKey, CryptoError>;

    /// One combined check of many signers over the same message.
    ///
    /// The default runs a randomly weighted batch check of the pairs.
    fn verify_same_message(
        &self,
        message: &SigningRoot,
        pairs: &[PublicKeySignaturePair],
    ) -> Result<bool, CryptoError> {
        if pairs.is_empty() {
            return Err(CryptoError::MalformedBatch("no pairs to verify".to_string()));
        }
        let sets: Vec<ResolvedSignatureSet> = pairs
            .iter()
            .map(|pair| ResolvedSignatureSet {
                public_key: pair.public_key.clone(),
                message: *message,
                signature: pair.signature.clone(),
            })
            .collect();
        self.verify_batch(&sets)
    }
}

/// An execution unit factory: thread, thread pool, process or remote worker.
///
/// Each pool worker owns one handle. The pool never issues a second `call` on
/// a handle before the previous one returned.
#[async_trait::async_trait]
pub trait ComputeExecutor: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// Start the execution unit for `worker_id`.
    async fn spawn(&self, worker_id: usize) -> Result<Self::Handle, ExecutorError>;

    /// Run one batched work request to completion.
    async fn call(
        &self,
        handle: &Self::Handle,
        request: WorkRequest,
    ) -> Result<WorkResult, ExecutorError>;

    /// Stop the execution unit and release its resources.
    async fn terminate(&self, handle: Self::Handle) -> Result<(), ExecutorError>;
}
