//! Fuzz target for BLS signature verification.
//!
//! Malformed and adversarial point encodings must verify as `false` (or fail
//! aggregation with an error), never panic.
//!
//! ## Running
//!
//! ```bash
//! cd crates/qc-10-bls-batch-verifier
//! cargo +nightly fuzz run fuzz_bls_verify
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use qc_10_bls_batch_verifier::{
    aggregate_bls_public_keys, verify_bls, verify_bls_batch, BlsPublicKey, BlsSignature,
    ResolvedSignatureSet,
};

/// Fuzz input structure for BLS verification.
#[derive(Debug, arbitrary::Arbitrary)]
struct BlsFuzzInput {
    /// Signing root
    message: [u8; 32],
    /// Signature bytes (96 bytes for BLS12-381 G2)
    signature_bytes: [u8; 96],
    /// Public key bytes (48 bytes for BLS12-381 G1)
    pubkey_bytes: [u8; 48],
    /// Extra keys for aggregation
    extra_keys: Vec<[u8; 48]>,
}

fuzz_target!(|input: BlsFuzzInput| {
    let set = ResolvedSignatureSet {
        public_key: BlsPublicKey::from_bytes(input.pubkey_bytes),
        message: input.message,
        signature: BlsSignature::from_bytes(input.signature_bytes),
    };

    // Verify - this should NEVER panic, regardless of input
    let result = verify_bls(&set);
    assert_eq!(result, verify_bls(&set));

    // A batch of one agrees with the single check
    assert_eq!(verify_bls_batch(std::slice::from_ref(&set)), Ok(result));

    let keys: Vec<BlsPublicKey> = input
        .extra_keys
        .iter()
        .map(|bytes| BlsPublicKey::from_bytes(*bytes))
        .collect();
    let _ = aggregate_bls_public_keys(&keys);
});
