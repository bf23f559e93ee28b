//! Shared helpers for the pool integration tests.
//!
//! Scheduling properties are tested against [`FlagCrypto`], where a signature
//! is invalid iff its first byte is `0xFF`, and [`TestExecutor`], which can
//! hold calls or worker start-up behind a semaphore and records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use qc_10_bls_batch_verifier::{
    run_work_requests, BlsCrypto, BlsPoolConfig, BlsPublicKey, BlsSignature, BlsVerifier,
    BlsWorkerPool, ComputeExecutor, CryptoError, ExecutorError, PublicKeySignaturePair,
    ResolvedSignatureSet, SignatureSet, SigningRoot, WorkRequest, WorkResult,
};
use quantum_telemetry::{BlsPoolMetrics, TelemetryConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const INVALID_MARK: u8 = 0xFF;

// =============================================================================
// CRYPTO
// =============================================================================

#[derive(Default)]
pub struct FlagCrypto {
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
}

impl BlsCrypto for FlagCrypto {
    fn verify_single(&self, set: &ResolvedSignatureSet) -> Result<bool, CryptoError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(set.signature.bytes[0] != INVALID_MARK)
    }

    fn verify_batch(&self, sets: &[ResolvedSignatureSet]) -> Result<bool, CryptoError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(sets.iter().all(|s| s.signature.bytes[0] != INVALID_MARK))
    }

    fn aggregate_public_keys(&self, keys: &[BlsPublicKey]) -> Result<BlsPublicKey, CryptoError> {
        keys.first().cloned().ok_or(CryptoError::EmptyAggregation)
    }
}

/// A signature set tagged by its signing root.
pub fn set(tag: u8, valid: bool) -> SignatureSet {
    SignatureSet::single(
        BlsPublicKey::from_bytes([1u8; 48]),
        [tag; 32],
        signature(valid),
    )
}

pub fn sets(count: usize, valid: bool) -> Vec<SignatureSet> {
    (0..count).map(|i| set(i as u8, valid)).collect()
}

pub fn pair(valid: bool) -> PublicKeySignaturePair {
    PublicKeySignaturePair::new(BlsPublicKey::from_bytes([1u8; 48]), signature(valid))
}

pub fn signature(valid: bool) -> BlsSignature {
    let mut bytes = [0u8; 96];
    if !valid {
        bytes[0] = INVALID_MARK;
    }
    BlsSignature::from_bytes(bytes)
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// What one executor call carried.
#[derive(Clone, Debug)]
pub struct CallRecord {
    pub worker_id: usize,
    pub item_count: usize,
    pub sig_count: usize,
    /// Signing root tag of each item's first set (`Default` only)
    pub item_tags: Vec<u8>,
}

#[derive(Default)]
pub struct TestExecutor {
    pub crypto: Arc<FlagCrypto>,
    pub calls: Arc<Mutex<Vec<CallRecord>>>,
    pub terminated: Arc<AtomicUsize>,
    pub call_gate: Option<Arc<Semaphore>>,
    pub spawn_gate: Option<Arc<Semaphore>>,
    pub fail_spawn: bool,
    pub fail_calls: bool,
}

impl TestExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for one permit of the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.call_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Every worker start-up waits for one permit of the returned semaphore.
    pub fn spawn_gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.spawn_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    pub fn failing_calls(mut self) -> Self {
        self.fail_calls = true;
        self
    }

    pub fn recorder(&self) -> ExecutorRecorder {
        ExecutorRecorder {
            crypto: Arc::clone(&self.crypto),
            calls: Arc::clone(&self.calls),
            terminated: Arc::clone(&self.terminated),
        }
    }
}

/// Observation handles that outlive the executor moved into the pool.
#[derive(Clone)]
pub struct ExecutorRecorder {
    pub crypto: Arc<FlagCrypto>,
    pub calls: Arc<Mutex<Vec<CallRecord>>>,
    pub terminated: Arc<AtomicUsize>,
}

impl ExecutorRecorder {
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ComputeExecutor for TestExecutor {
    type Handle = usize;

    async fn spawn(&self, worker_id: usize) -> Result<usize, ExecutorError> {
        if let Some(gate) = &self.spawn_gate {
            gate.acquire()
                .await
                .map_err(|e| ExecutorError::SpawnFailed(e.to_string()))?
                .forget();
        }
        if self.fail_spawn {
            return Err(ExecutorError::SpawnFailed(format!(
                "worker {worker_id} refused to start"
            )));
        }
        Ok(worker_id)
    }

    async fn call(&self, worker_id: &usize, request: WorkRequest) -> Result<WorkResult, ExecutorError> {
        let item_tags = match &request {
            WorkRequest::Default { items, .. } => items
                .iter()
                .map(|item| item.sets[0].signing_root[0])
                .collect(),
            WorkRequest::SameMessage { .. } => Vec::new(),
        };
        self.calls.lock().unwrap().push(CallRecord {
            worker_id: *worker_id,
            item_count: request.item_count(),
            sig_count: request.sig_count(),
            item_tags,
        });

        if let Some(gate) = &self.call_gate {
            gate.acquire()
                .await
                .map_err(|e| ExecutorError::CallFailed(e.to_string()))?
                .forget();
        }
        if self.fail_calls {
            return Err(ExecutorError::CallFailed("connection reset".to_string()));
        }
        Ok(run_work_requests(&*self.crypto, *worker_id, request))
    }

    async fn terminate(&self, _worker_id: usize) -> Result<(), ExecutorError> {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// POOL
// =============================================================================

pub fn config(pool_size: usize) -> BlsPoolConfig {
    BlsPoolConfig::default()
        .with_pool_size(pool_size)
        .with_max_buffer_wait(Duration::from_millis(50))
}

/// Install the global subscriber once per test binary; true if it took.
pub fn init_logging() -> bool {
    static INSTALLED: OnceLock<bool> = OnceLock::new();
    *INSTALLED.get_or_init(|| {
        let config = TelemetryConfig::default().with_log_level("warn");
        quantum_telemetry::init_logging(&config).is_ok()
    })
}

pub fn pool(config: BlsPoolConfig, executor: TestExecutor) -> BlsWorkerPool {
    pool_with_metrics(config, executor, None)
}

pub fn pool_with_metrics(
    config: BlsPoolConfig,
    executor: TestExecutor,
    metrics: Option<BlsPoolMetrics>,
) -> BlsWorkerPool {
    init_logging();
    let crypto: Arc<dyn BlsCrypto> = Arc::clone(&executor.crypto) as Arc<dyn BlsCrypto>;
    BlsWorkerPool::new(config, crypto, executor, metrics).unwrap()
}

pub fn metrics() -> (prometheus::Registry, BlsPoolMetrics) {
    let registry = prometheus::Registry::new();
    let metrics = BlsPoolMetrics::new(&registry).unwrap();
    (registry, metrics)
}

/// Poll `condition` every few milliseconds, panicking after two seconds.
pub async fn wait_for(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {description}");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Keep `pool` alive for the duration of a spawned verify call.
pub fn spawn_verify(
    pool: &Arc<BlsWorkerPool>,
    sets: Vec<SignatureSet>,
    opts: qc_10_bls_batch_verifier::VerifyOpts,
) -> tokio::task::JoinHandle<Result<bool, qc_10_bls_batch_verifier::BlsPoolError>> {
    let pool = Arc::clone(pool);
    tokio::spawn(async move { pool.verify_signature_sets(sets, opts).await })
}

pub fn root(tag: u8) -> SigningRoot {
    [tag; 32]
}
