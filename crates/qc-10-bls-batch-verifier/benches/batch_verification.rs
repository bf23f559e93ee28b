//! # BLS Batch Verification Benchmarks
//!
//! | Case | Expectation |
//! |------|-------------|
//! | single set | one pairing check |
//! | all valid batch | well below N single checks |
//! | one invalid set | one failed batch plus N single checks |
//! | same message | one pairing check for the weighted aggregate |

use blst::min_pk::SecretKey;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qc_10_bls_batch_verifier::domain::work::{resolve_sets, DefaultWorkItem};
use qc_10_bls_batch_verifier::{
    run_work_requests, verify_bls, verify_bls_batch, verify_bls_same_message, BlsPublicKey,
    BlsSignature, BlstCrypto, PublicKeySignaturePair, ResolvedSignatureSet, SignatureSet,
    SigningRoot, WorkRequest, DST,
};
use std::time::Duration;

const BATCHABLE_MIN_PER_CHUNK: usize = 16;

fn signed_sets(count: usize) -> Vec<SignatureSet> {
    (0..count)
        .map(|i| {
            let mut ikm = [0u8; 32];
            ikm[..8].copy_from_slice(&(i as u64 + 1).to_le_bytes());
            let sk = SecretKey::key_gen(&ikm, &[]).unwrap();
            let root = [i as u8; 32];
            SignatureSet::single(
                BlsPublicKey::from_bytes(sk.sk_to_pk().to_bytes()),
                root,
                BlsSignature::from_bytes(sk.sign(&root, DST, &[]).to_bytes()),
            )
        })
        .collect()
}

fn same_message_pairs(message: &SigningRoot, count: usize) -> Vec<PublicKeySignaturePair> {
    (0..count)
        .map(|i| {
            let mut ikm = [0u8; 32];
            ikm[..8].copy_from_slice(&(i as u64 + 1).to_le_bytes());
            let sk = SecretKey::key_gen(&ikm, &[]).unwrap();
            PublicKeySignaturePair::new(
                BlsPublicKey::from_bytes(sk.sk_to_pk().to_bytes()),
                BlsSignature::from_bytes(sk.sign(message, DST, &[]).to_bytes()),
            )
        })
        .collect()
}

fn request(sets: &[SignatureSet]) -> WorkRequest {
    WorkRequest::Default {
        items: sets
            .iter()
            .map(|set| DefaultWorkItem {
                batchable: true,
                sets: vec![set.clone()],
            })
            .collect(),
        batchable_min_per_chunk: BATCHABLE_MIN_PER_CHUNK,
    }
}

fn bench_single_verification(c: &mut Criterion) {
    let resolved = resolve_sets(&BlstCrypto::new(), &signed_sets(1)).unwrap();

    c.bench_function("bls_verify_single", |b| {
        b.iter(|| black_box(verify_bls(&resolved[0])))
    });
}

fn bench_batch_verification(c: &mut Criterion) {
    let mut group = c.benchmark_group("bls-batch-verification");
    group.measurement_time(Duration::from_secs(10));
    let crypto = BlstCrypto::new();

    for size in [16, 32, 64, 128] {
        let valid = signed_sets(size);
        let mut one_invalid = valid.clone();
        one_invalid[size / 2].signing_root = [0xEE; 32];

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("all_valid", size), &valid, |b, sets| {
            b.iter(|| black_box(run_work_requests(&crypto, 0, request(sets))))
        });
        group.bench_with_input(
            BenchmarkId::new("one_invalid", size),
            &one_invalid,
            |b, sets| b.iter(|| black_box(run_work_requests(&crypto, 0, request(sets)))),
        );
    }

    group.finish();
}

fn bench_same_message_verification(c: &mut Criterion) {
    let mut group = c.benchmark_group("bls-same-message-verification");
    group.measurement_time(Duration::from_secs(10));
    let message = [0x5A; 32];

    for size in [16, 64, 128] {
        let pairs = same_message_pairs(&message, size);
        let sets: Vec<_> = pairs
            .iter()
            .map(|pair| ResolvedSignatureSet {
                public_key: pair.public_key.clone(),
                message,
                signature: pair.signature.clone(),
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("weighted_aggregate", size),
            &pairs,
            |b, pairs| b.iter(|| black_box(verify_bls_same_message(&message, pairs))),
        );
        group.bench_with_input(BenchmarkId::new("n_message_batch", size), &sets, |b, sets| {
            b.iter(|| black_box(verify_bls_batch(sets)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_verification,
    bench_batch_verification,
    bench_same_message_verification
);
criterion_main!(benches);
