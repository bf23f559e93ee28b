//! # Inbound Ports (Driving Ports / API)
//!
//! The verification API used by block import, gossip validation and sync.

use crate::domain::entities::{PublicKeySignaturePair, SignatureSet, SigningRoot, VerifyOpts};
use crate::domain::errors::BlsPoolError;

/// BLS signature verification service.
///
/// Implementations must be thread-safe (`Send + Sync`). Every call resolves
/// exactly once; an invalid signature resolves to `false`, never to an error.
#[async_trait::async_trait]
pub trait BlsVerifier: Send + Sync {
    /// Verify a list of signature sets.
    ///
    /// Resolves `true` iff every set is valid.
    ///
    /// # Errors
    /// * `EmptyInput` if `sets` is empty
    /// * `Aborted` if the verifier is closed or closes before completion
    async fn verify_signature_sets(
        &self,
        sets: Vec<SignatureSet>,
        opts: VerifyOpts,
    ) -> Result<bool, BlsPoolError>;

    /// Verify many signers of one message.
    ///
    /// Resolves one boolean per pair, in input order. One bad pair never
    /// turns a valid pair's result `false`.
    async fn verify_signature_sets_same_message(
        &self,
        pairs: Vec<PublicKeySignaturePair>,
        message: SigningRoot,
        opts: VerifyOpts,
    ) -> Result<Vec<bool>, BlsPoolError>;

    /// Backpressure signal: `false` while every worker is busy or the job
    /// queue is full. Advisory only.
    fn can_accept_work(&self) -> bool;

    /// Reject all pending work with `Aborted` and release every worker.
    async fn close(&self);
}
