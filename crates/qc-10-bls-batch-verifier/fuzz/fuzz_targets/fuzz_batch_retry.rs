//! Fuzz target for the worker-side batch-retry coordinator.
//!
//! Whatever the mix of valid, invalid, batchable and non-batchable items and
//! whatever the chunk size, every item's result must equal the AND of its own
//! sets' validity.

#![no_main]

use libfuzzer_sys::fuzz_target;
use qc_10_bls_batch_verifier::domain::work::DefaultWorkItem;
use qc_10_bls_batch_verifier::{
    run_work_requests, BlsCrypto, BlsPublicKey, BlsSignature, CryptoError, ResolvedSignatureSet,
    SignatureSet, WorkRequest,
};

/// Signature byte 0 == 0 marks an invalid signature.
struct FlagCrypto;

impl BlsCrypto for FlagCrypto {
    fn verify_single(&self, set: &ResolvedSignatureSet) -> Result<bool, CryptoError> {
        Ok(set.signature.bytes[0] != 0)
    }

    fn verify_batch(&self, sets: &[ResolvedSignatureSet]) -> Result<bool, CryptoError> {
        Ok(sets.iter().all(|s| s.signature.bytes[0] != 0))
    }

    fn aggregate_public_keys(&self, keys: &[BlsPublicKey]) -> Result<BlsPublicKey, CryptoError> {
        keys.first().cloned().ok_or(CryptoError::EmptyAggregation)
    }
}

#[derive(Debug, arbitrary::Arbitrary)]
struct FuzzItem {
    batchable: bool,
    /// One entry per set, `true` = valid
    sets: Vec<bool>,
}

#[derive(Debug, arbitrary::Arbitrary)]
struct FuzzInput {
    min_per_chunk: u8,
    items: Vec<FuzzItem>,
}

fuzz_target!(|input: FuzzInput| {
    let items: Vec<DefaultWorkItem> = input
        .items
        .iter()
        .filter(|item| !item.sets.is_empty())
        .map(|item| DefaultWorkItem {
            batchable: item.batchable,
            sets: item
                .sets
                .iter()
                .map(|valid| {
                    SignatureSet::single(
                        BlsPublicKey::from_bytes([1u8; 48]),
                        [0u8; 32],
                        BlsSignature::from_bytes([u8::from(*valid); 96]),
                    )
                })
                .collect(),
        })
        .collect();
    let expected: Vec<bool> = input
        .items
        .iter()
        .filter(|item| !item.sets.is_empty())
        .map(|item| item.sets.iter().all(|valid| *valid))
        .collect();

    let result = run_work_requests(
        &FlagCrypto,
        0,
        WorkRequest::Default {
            items,
            batchable_min_per_chunk: usize::from(input.min_per_chunk),
        },
    );

    let actual: Vec<bool> = result
        .results
        .iter()
        .map(|r| r.clone().unwrap_or(false))
        .collect();
    assert_eq!(actual, expected);
});
