//! # Domain Entities
//!
//! Core data structures for BLS signature verification requests.
//!
//! Ethereum consensus uses the `min_pk` flavour of BLS12-381:
//! - Public keys are G1 points (48 bytes compressed)
//! - Signatures are G2 points (96 bytes compressed)

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

/// 32-byte signing root (the message actually signed).
pub type SigningRoot = [u8; 32];

// =============================================================================
// BLS Types (BLS12-381, min_pk)
// =============================================================================

/// BLS public key (G1 point, compressed).
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlsPublicKey {
    /// G1 point (48 bytes compressed)
    #[serde_as(as = "Bytes")]
    pub bytes: [u8; 48],
}

impl BlsPublicKey {
    pub fn from_bytes(bytes: [u8; 48]) -> Self {
        Self { bytes }
    }
}

/// BLS signature (G2 point, compressed).
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlsSignature {
    /// G2 point (96 bytes compressed)
    #[serde_as(as = "Bytes")]
    pub bytes: [u8; 96],
}

impl BlsSignature {
    pub fn from_bytes(bytes: [u8; 96]) -> Self {
        Self { bytes }
    }
}

// =============================================================================
// Signature Sets
// =============================================================================

/// The signing key of a [`SignatureSet`].
///
/// Attestations carry one signature over the keys of every participating
/// validator. Those keys are aggregated lazily, on the worker, right before
/// verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetPublicKey {
    /// A single (or already aggregated) public key
    Single(BlsPublicKey),
    /// Participant keys still to be aggregated
    Aggregate(Vec<BlsPublicKey>),
}

impl SetPublicKey {
    /// Number of keys that must be aggregated before verifying (0 for `Single`).
    pub fn aggregation_count(&self) -> usize {
        match self {
            SetPublicKey::Single(_) => 0,
            SetPublicKey::Aggregate(keys) => keys.len(),
        }
    }
}

/// A (public key, signing root, signature) triple to verify.
///
/// Immutable once submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSet {
    pub public_key: SetPublicKey,
    pub signing_root: SigningRoot,
    pub signature: BlsSignature,
}

impl SignatureSet {
    /// Signature set signed by a single key.
    pub fn single(public_key: BlsPublicKey, signing_root: SigningRoot, signature: BlsSignature) -> Self {
        Self {
            public_key: SetPublicKey::Single(public_key),
            signing_root,
            signature,
        }
    }

    /// Signature set signed by several participants over the same root.
    pub fn aggregate(
        public_keys: Vec<BlsPublicKey>,
        signing_root: SigningRoot,
        signature: BlsSignature,
    ) -> Self {
        Self {
            public_key: SetPublicKey::Aggregate(public_keys),
            signing_root,
            signature,
        }
    }
}

/// A signature set whose public key has been resolved to a single point.
///
/// This is what the crypto collaborator actually verifies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSignatureSet {
    pub public_key: BlsPublicKey,
    pub message: SigningRoot,
    pub signature: BlsSignature,
}

/// One signer of a same-message request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeySignaturePair {
    pub public_key: BlsPublicKey,
    pub signature: BlsSignature,
}

impl PublicKeySignaturePair {
    pub fn new(public_key: BlsPublicKey, signature: BlsSignature) -> Self {
        Self {
            public_key,
            signature,
        }
    }

    /// Treat this pair as a standalone signature set over `message`.
    pub fn to_signature_set(&self, message: SigningRoot) -> SignatureSet {
        SignatureSet::single(self.public_key.clone(), message, self.signature.clone())
    }
}

// =============================================================================
// Submission Options
// =============================================================================

/// Per-request scheduling hints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOpts {
    /// Jump ahead of non-priority work of the same batchability class
    pub priority: bool,
    /// May be buffered and verified together with other batchable work
    pub batchable: bool,
    /// Verify on the calling task, skipping the pool entirely
    pub verify_on_main_thread: bool,
}

impl VerifyOpts {
    pub fn batchable() -> Self {
        Self {
            batchable: true,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_main_thread(mut self, verify_on_main_thread: bool) -> Self {
        self.verify_on_main_thread = verify_on_main_thread;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_count() {
        let pk = BlsPublicKey::from_bytes([1u8; 48]);
        assert_eq!(SetPublicKey::Single(pk.clone()).aggregation_count(), 0);
        assert_eq!(
            SetPublicKey::Aggregate(vec![pk.clone(), pk.clone(), pk]).aggregation_count(),
            3
        );
    }

    #[test]
    fn test_pair_to_signature_set_keeps_message() {
        let pair = PublicKeySignaturePair::new(
            BlsPublicKey::from_bytes([2u8; 48]),
            BlsSignature::from_bytes([3u8; 96]),
        );
        let set = pair.to_signature_set([9u8; 32]);

        assert_eq!(set.signing_root, [9u8; 32]);
        assert_eq!(set.public_key, SetPublicKey::Single(pair.public_key));
        assert_eq!(set.signature, pair.signature);
    }

    #[test]
    fn test_verify_opts_builders() {
        let opts = VerifyOpts::batchable().with_priority(true);
        assert!(opts.batchable);
        assert!(opts.priority);
        assert!(!opts.verify_on_main_thread);
    }

    #[test]
    fn test_signature_set_serde_roundtrip() {
        let set = SignatureSet::aggregate(
            vec![BlsPublicKey::from_bytes([4u8; 48])],
            [5u8; 32],
            BlsSignature::from_bytes([6u8; 96]),
        );
        let json = serde_json::to_string(&set).unwrap();
        let back: SignatureSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
