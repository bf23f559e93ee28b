//! # BLS Verification Service
//!
//! Application service layer implementing the [`BlsVerifier`] inbound port.
//!
//! ## Architecture
//!
//! - [`BlsWorkerPool`]: chunks requests into jobs and hands them to the
//!   dispatcher task, which batches them onto a fixed set of compute executors
//! - [`InlineBlsVerifier`]: verifies everything on the calling task
//!
//! Both resolve an invalid signature to `false` and never to an error.

use crate::adapters::executor::RayonExecutor;
use crate::dispatcher::{Dispatcher, Request, SharedState};
use crate::domain::bls::BlstCrypto;
use crate::domain::chunk::chunkify_maximize_chunk_size;
use crate::domain::config::BlsPoolConfig;
use crate::domain::entities::{PublicKeySignaturePair, SignatureSet, SigningRoot, VerifyOpts};
use crate::domain::errors::{BlsPoolError, ConfigError};
use crate::domain::job::{await_outcome, Continuation, DefaultJob, Job, SameMessageJob};
use crate::domain::work::{resolve_sets, verify_sets_maybe_batch};
use crate::ports::inbound::BlsVerifier;
use crate::ports::outbound::{BlsCrypto, ComputeExecutor};
use async_trait::async_trait;
use futures::future::try_join_all;
use quantum_telemetry::{time_histogram, BlsPoolMetrics, HistogramTimer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// WORKER POOL
// =============================================================================

/// Batching BLS verification pool.
///
/// Dropping the pool shuts it down like [`BlsVerifier::close`].
pub struct BlsWorkerPool {
    config: BlsPoolConfig,
    crypto: Arc<dyn BlsCrypto>,
    requests: mpsc::UnboundedSender<Request>,
    shared: Arc<SharedState>,
    metrics: Option<BlsPoolMetrics>,
}

impl BlsWorkerPool {
    /// Start a pool over `executor`.
    ///
    /// `crypto` serves the main-thread path; the executor brings its own.
    /// Must be called from within a tokio runtime.
    pub fn new<E: ComputeExecutor>(
        config: BlsPoolConfig,
        crypto: Arc<dyn BlsCrypto>,
        executor: E,
        metrics: Option<BlsPoolMetrics>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (requests, requests_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::default());
        let dispatcher = Dispatcher::new(
            config.clone(),
            executor,
            Arc::clone(&shared),
            metrics.clone(),
            requests_rx,
        );
        tokio::spawn(dispatcher.run());

        Ok(Self {
            config,
            crypto,
            requests,
            shared,
            metrics,
        })
    }

    /// Production pool: blst crypto on one rayon thread per worker.
    pub fn with_blst(
        config: BlsPoolConfig,
        metrics: Option<BlsPoolMetrics>,
    ) -> Result<Self, ConfigError> {
        let crypto: Arc<dyn BlsCrypto> = Arc::new(BlstCrypto::new());
        let executor = RayonExecutor::new(Arc::clone(&crypto));
        Self::new(config, crypto, executor, metrics)
    }

    pub fn config(&self) -> &BlsPoolConfig {
        &self.config
    }

    /// Wait until every worker has either started or failed to start.
    ///
    /// # Errors
    /// * `Initialization` if no worker could be started
    /// * `Aborted` if the pool closed first
    pub async fn wait_till_initialized(&self) -> Result<(), BlsPoolError> {
        let (waiter, outcome) = oneshot::channel();
        self.requests
            .send(Request::WaitInitialized(waiter))
            .map_err(|_| BlsPoolError::Aborted)?;
        outcome.await.unwrap_or(Err(BlsPoolError::Aborted))
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn submit(&self, job: Job) -> Result<(), BlsPoolError> {
        self.requests
            .send(Request::Submit(job))
            .map_err(|_| BlsPoolError::Aborted)
    }

    fn record_submission(&self, sets: &[SignatureSet], opts: VerifyOpts) {
        if let Some(metrics) = &self.metrics {
            count_submission(metrics, sets.len(), opts);
            let aggregated: usize = sets.iter().map(|s| s.public_key.aggregation_count()).sum();
            metrics.aggregated_pubkeys.inc_by(aggregated as f64);
        }
    }
}

#[async_trait]
impl BlsVerifier for BlsWorkerPool {
    async fn verify_signature_sets(
        &self,
        sets: Vec<SignatureSet>,
        opts: VerifyOpts,
    ) -> Result<bool, BlsPoolError> {
        if self.is_closed() {
            return Err(BlsPoolError::Aborted);
        }
        if sets.is_empty() {
            return Err(BlsPoolError::EmptyInput);
        }
        self.record_submission(&sets, opts);

        if opts.verify_on_main_thread && !self.config.verify_all_in_pool {
            let _timer = self
                .metrics
                .as_ref()
                .map(|m| time_histogram!(m.main_thread_duration));
            let resolved = resolve_sets(&*self.crypto, &sets)?;
            return Ok(verify_sets_maybe_batch(&*self.crypto, &resolved));
        }

        let now = Instant::now();
        let receivers = chunkify_maximize_chunk_size(sets, self.config.max_signature_sets_per_job)
            .into_iter()
            .map(|sets| {
                let (continuation, receiver) = Continuation::new();
                self.submit(Job::Default(DefaultJob {
                    sets,
                    opts,
                    added_at: now,
                    continuation,
                }))?;
                Ok(receiver)
            })
            .collect::<Result<Vec<_>, BlsPoolError>>()?;

        let results = try_join_all(receivers.into_iter().map(await_outcome)).await?;
        Ok(results.into_iter().all(|valid| valid))
    }

    async fn verify_signature_sets_same_message(
        &self,
        pairs: Vec<PublicKeySignaturePair>,
        message: SigningRoot,
        opts: VerifyOpts,
    ) -> Result<Vec<bool>, BlsPoolError> {
        if self.is_closed() {
            return Err(BlsPoolError::Aborted);
        }
        if pairs.is_empty() {
            return Err(BlsPoolError::EmptyInput);
        }
        if let Some(metrics) = &self.metrics {
            count_submission(metrics, pairs.len(), opts);
        }

        let now = Instant::now();
        let receivers = chunkify_maximize_chunk_size(pairs, self.config.max_signature_sets_per_job)
            .into_iter()
            .map(|pairs| {
                let (continuation, receiver) = Continuation::new();
                self.submit(Job::SameMessage(SameMessageJob {
                    message,
                    pairs,
                    opts,
                    added_at: now,
                    continuation,
                }))?;
                Ok(receiver)
            })
            .collect::<Result<Vec<_>, BlsPoolError>>()?;

        let results = try_join_all(receivers.into_iter().map(await_outcome)).await?;
        Ok(results.into_iter().flatten().collect())
    }

    fn can_accept_work(&self) -> bool {
        self.shared.workers_busy.load(Ordering::Acquire) < self.config.pool_size
            && self.shared.queue_len.load(Ordering::Acquire) < self.config.max_jobs_can_accept_work
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);

        let (ack, done) = oneshot::channel();
        if self.requests.send(Request::Close(ack)).is_err() {
            return;
        }
        let _ = done.await;
    }
}

fn count_submission(metrics: &BlsPoolMetrics, count: usize, opts: VerifyOpts) {
    let count = count as f64;
    metrics.total_sig_sets.inc_by(count);
    if opts.priority {
        metrics.prioritized_sig_sets.inc_by(count);
    }
    if opts.batchable {
        metrics.batchable_sig_sets.inc_by(count);
    }
}

// =============================================================================
// INLINE VERIFIER
// =============================================================================

/// Verifies every request on the calling task, without any workers.
///
/// Same results as [`BlsWorkerPool`], no batching across requests. Meant for
/// tests and light clients.
pub struct InlineBlsVerifier {
    crypto: Arc<dyn BlsCrypto>,
    closed: AtomicBool,
    metrics: Option<BlsPoolMetrics>,
}

impl InlineBlsVerifier {
    pub fn new(crypto: Arc<dyn BlsCrypto>, metrics: Option<BlsPoolMetrics>) -> Self {
        Self {
            crypto,
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    fn timer(&self) -> Option<HistogramTimer> {
        self.metrics
            .as_ref()
            .map(|m| time_histogram!(m.main_thread_duration))
    }
}

impl Default for InlineBlsVerifier {
    fn default() -> Self {
        Self::new(Arc::new(BlstCrypto::new()), None)
    }
}

#[async_trait]
impl BlsVerifier for InlineBlsVerifier {
    async fn verify_signature_sets(
        &self,
        sets: Vec<SignatureSet>,
        opts: VerifyOpts,
    ) -> Result<bool, BlsPoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BlsPoolError::Aborted);
        }
        if sets.is_empty() {
            return Err(BlsPoolError::EmptyInput);
        }
        if let Some(metrics) = &self.metrics {
            count_submission(metrics, sets.len(), opts);
        }

        let _timer = self.timer();
        let resolved = resolve_sets(&*self.crypto, &sets)?;
        Ok(verify_sets_maybe_batch(&*self.crypto, &resolved))
    }

    async fn verify_signature_sets_same_message(
        &self,
        pairs: Vec<PublicKeySignaturePair>,
        message: SigningRoot,
        opts: VerifyOpts,
    ) -> Result<Vec<bool>, BlsPoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BlsPoolError::Aborted);
        }
        if pairs.is_empty() {
            return Err(BlsPoolError::EmptyInput);
        }
        if let Some(metrics) = &self.metrics {
            count_submission(metrics, pairs.len(), opts);
        }

        let _timer = self.timer();
        if matches!(self.crypto.verify_same_message(&message, &pairs), Ok(true)) {
            return Ok(vec![true; pairs.len()]);
        }

        Ok(pairs
            .iter()
            .map(|pair| {
                let set = pair.to_signature_set(message);
                resolve_sets(&*self.crypto, std::slice::from_ref(&set))
                    .map(|resolved| verify_sets_maybe_batch(&*self.crypto, &resolved))
                    .unwrap_or(false)
            })
            .collect())
    }

    fn can_accept_work(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
