//! # Work Requests and the Batch-Retry Coordinator
//!
//! What an executor receives and what it runs. [`run_work_requests`] is the
//! worker-side half of the batch-retry logic:
//!
//! ```text
//! batchable items ──chunks of ≥ min──→ combined batch check ──ok──→ true for every item
//!                                             │
//!                                          fail/err
//!                                             ↓
//! non-batchable items ───────────────→ verify each item on its own
//! ```
//!
//! A set is never reported invalid just because the batch it was part of
//! failed; only its own re-verification decides.

use super::chunk::chunkify_min_chunk_size;
use super::entities::{
    PublicKeySignaturePair, ResolvedSignatureSet, SetPublicKey, SignatureSet, SigningRoot,
};
use super::errors::CryptoError;
use crate::ports::outbound::BlsCrypto;
use std::time::Instant;
use tracing::{debug, warn};

/// A `Default` job as shipped to a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultWorkItem {
    pub batchable: bool,
    pub sets: Vec<SignatureSet>,
}

/// A `SameMessage` job as shipped to a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SameMessageWorkItem {
    pub message: SigningRoot,
    pub pairs: Vec<PublicKeySignaturePair>,
}

/// One batched executor call. Never mixes job kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkRequest {
    Default {
        items: Vec<DefaultWorkItem>,
        batchable_min_per_chunk: usize,
    },
    SameMessage {
        items: Vec<SameMessageWorkItem>,
    },
}

impl WorkRequest {
    pub fn item_count(&self) -> usize {
        match self {
            WorkRequest::Default { items, .. } => items.len(),
            WorkRequest::SameMessage { items } => items.len(),
        }
    }

    pub fn sig_count(&self) -> usize {
        match self {
            WorkRequest::Default { items, .. } => items.iter().map(|i| i.sets.len()).sum(),
            WorkRequest::SameMessage { items } => items.iter().map(|i| i.pairs.len()).sum(),
        }
    }
}

/// Outcome of one executor call, one entry in `results` per request item.
///
/// For `SameMessage` items the entry is the combined check only; per-pair
/// isolation is up to the dispatcher.
#[derive(Clone, Debug)]
pub struct WorkResult {
    pub worker_id: usize,
    /// Combined batch checks that failed and fell back to individual checks
    pub batch_retries: usize,
    /// Sets confirmed by a successful combined check
    pub batch_sigs_success: usize,
    pub worker_start: Instant,
    pub worker_end: Instant,
    pub results: Vec<Result<bool, CryptoError>>,
}

/// Run a work request to completion. Called on the executor's thread.
pub fn run_work_requests<C>(crypto: &C, worker_id: usize, request: WorkRequest) -> WorkResult
where
    C: BlsCrypto + ?Sized,
{
    let worker_start = Instant::now();

    let (results, batch_retries, batch_sigs_success) = match request {
        WorkRequest::Default {
            items,
            batchable_min_per_chunk,
        } => run_default_items(crypto, items, batchable_min_per_chunk),
        WorkRequest::SameMessage { items } => run_same_message_items(crypto, items),
    };

    WorkResult {
        worker_id,
        batch_retries,
        batch_sigs_success,
        worker_start,
        worker_end: Instant::now(),
        results,
    }
}

fn run_default_items<C>(
    crypto: &C,
    items: Vec<DefaultWorkItem>,
    batchable_min_per_chunk: usize,
) -> (Vec<Result<bool, CryptoError>>, usize, usize)
where
    C: BlsCrypto + ?Sized,
{
    let mut results: Vec<Option<Result<bool, CryptoError>>> = vec![None; items.len()];
    let mut batch_retries = 0;
    let mut batch_sigs_success = 0;

    // Keep the original index of every item so results line up with the request.
    let mut batchable = Vec::new();
    let mut individual = Vec::new();

    for (idx, item) in items.into_iter().enumerate() {
        match resolve_sets(crypto, &item.sets) {
            Ok(sets) if item.batchable => batchable.push((idx, sets)),
            Ok(sets) => individual.push((idx, sets)),
            Err(err) => results[idx] = Some(Err(err)),
        }
    }

    for chunk in chunkify_min_chunk_size(batchable, batchable_min_per_chunk) {
        let all_sets: Vec<ResolvedSignatureSet> = chunk
            .iter()
            .flat_map(|(_, sets)| sets.iter().cloned())
            .collect();

        match crypto.verify_batch(&all_sets) {
            Ok(true) => {
                for (idx, sets) in chunk {
                    batch_sigs_success += sets.len();
                    results[idx] = Some(Ok(true));
                }
            }
            outcome => {
                batch_retries += 1;
                warn!(
                    sets = all_sets.len(),
                    error = ?outcome.err(),
                    "Batch check failed, re-verifying individually"
                );
                individual.extend(chunk);
            }
        }
    }

    for (idx, sets) in individual {
        results[idx] = Some(Ok(verify_sets_maybe_batch(crypto, &sets)));
    }

    let results = results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(CryptoError::MalformedBatch("item not verified".into()))))
        .collect();

    (results, batch_retries, batch_sigs_success)
}

fn run_same_message_items<C>(
    crypto: &C,
    items: Vec<SameMessageWorkItem>,
) -> (Vec<Result<bool, CryptoError>>, usize, usize)
where
    C: BlsCrypto + ?Sized,
{
    let mut batch_sigs_success = 0;

    let results = items
        .iter()
        .map(|item| {
            let outcome = crypto.verify_same_message(&item.message, &item.pairs);
            if matches!(outcome, Ok(true)) {
                batch_sigs_success += item.pairs.len();
            }
            outcome
        })
        .collect();

    (results, 0, batch_sigs_success)
}

/// Resolve every set's public key, aggregating participant keys where needed.
pub fn resolve_sets<C>(
    crypto: &C,
    sets: &[SignatureSet],
) -> Result<Vec<ResolvedSignatureSet>, CryptoError>
where
    C: BlsCrypto + ?Sized,
{
    sets.iter()
        .map(|set| {
            let public_key = match &set.public_key {
                SetPublicKey::Single(key) => key.clone(),
                SetPublicKey::Aggregate(keys) => crypto.aggregate_public_keys(keys)?,
            };
            Ok(ResolvedSignatureSet {
                public_key,
                message: set.signing_root,
                signature: set.signature.clone(),
            })
        })
        .collect()
}

/// Batch check for two or more sets, single check for one.
///
/// A check that cannot run at all counts as invalid.
pub fn verify_sets_maybe_batch<C>(crypto: &C, sets: &[ResolvedSignatureSet]) -> bool
where
    C: BlsCrypto + ?Sized,
{
    let outcome = match sets {
        [] => return false,
        [set] => crypto.verify_single(set),
        _ => crypto.verify_batch(sets),
    };
    outcome.unwrap_or_else(|err| {
        debug!(sets = sets.len(), error = %err, "Verification failed to run");
        false
    })
}
