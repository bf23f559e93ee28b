//! # Dispatcher
//!
//! The coordinating task of the pool. It exclusively owns the job queue, the
//! batch buffer and the worker table; everything else talks to it through
//! messages.
//!
//! ```text
//! BlsWorkerPool ──Request──→ ┌────────────┐ ──call──→ ComputeExecutor
//!                            │ Dispatcher │
//! worker tasks ─WorkerEvent→ └────────────┘ ←─ buffer deadline (sleep_until)
//! ```
//!
//! A dispatch cycle runs after every enqueue, every worker initialization and
//! every job group completion. `queue_len`, `workers_busy` and `closed` are
//! published through [`SharedState`] so `can_accept_work` never has to ask.

use crate::domain::config::BlsPoolConfig;
use crate::domain::errors::{BlsPoolError, ExecutorError};
use crate::domain::job::{
    await_outcome, BufferedBatchGroup, Continuation, DefaultJob, Job, JobKind, JobQueue,
    SameMessageJob,
};
use crate::domain::work::{DefaultWorkItem, SameMessageWorkItem, WorkRequest, WorkResult};
use crate::ports::outbound::ComputeExecutor;
use futures::future::try_join_all;
use quantum_telemetry::BlsPoolMetrics;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Messages from pool handles.
#[derive(Debug)]
pub(crate) enum Request {
    Submit(Job),
    WaitInitialized(oneshot::Sender<Result<(), BlsPoolError>>),
    Close(oneshot::Sender<()>),
}

/// Messages from the dispatcher's own worker tasks.
enum WorkerEvent<H> {
    Initialized {
        worker_id: usize,
        result: Result<H, ExecutorError>,
    },
    WorkDone {
        worker_id: usize,
        dispatched_at: Instant,
        outcome: Result<WorkResult, ExecutorError>,
    },
}

/// State readable from any thread without a round trip to the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub closed: AtomicBool,
    pub queue_len: AtomicUsize,
    pub workers_busy: AtomicUsize,
}

enum WorkerStatus<H> {
    NotInitialized,
    Initializing,
    InitializationError(String),
    Idle(H),
    Running {
        handle: H,
        jobs: Vec<Job>,
        task: JoinHandle<()>,
    },
}

struct WorkerDescriptor<H> {
    id: usize,
    status: WorkerStatus<H>,
}

pub(crate) struct Dispatcher<E: ComputeExecutor> {
    config: BlsPoolConfig,
    executor: Arc<E>,
    workers: Vec<WorkerDescriptor<E::Handle>>,
    queue: JobQueue,
    buffer: Option<BufferedBatchGroup>,
    shared: Arc<SharedState>,
    metrics: Option<BlsPoolMetrics>,
    requests: mpsc::UnboundedReceiver<Request>,
    events_tx: mpsc::UnboundedSender<WorkerEvent<E::Handle>>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent<E::Handle>>,
    init_tasks: Vec<JoinHandle<()>>,
    init_waiters: Vec<oneshot::Sender<Result<(), BlsPoolError>>>,
}

impl<E: ComputeExecutor> Dispatcher<E> {
    pub(crate) fn new(
        config: BlsPoolConfig,
        executor: E,
        shared: Arc<SharedState>,
        metrics: Option<BlsPoolMetrics>,
        requests: mpsc::UnboundedReceiver<Request>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let workers = (0..config.pool_size)
            .map(|id| WorkerDescriptor {
                id,
                status: WorkerStatus::NotInitialized,
            })
            .collect();

        Self {
            config,
            executor: Arc::new(executor),
            workers,
            queue: JobQueue::new(),
            buffer: None,
            shared,
            metrics,
            requests,
            events_tx,
            events_rx,
            init_tasks: Vec::new(),
            init_waiters: Vec::new(),
        }
    }

    /// Run until closed or until every pool handle is gone.
    pub(crate) async fn run(mut self) {
        self.start_workers();

        loop {
            let deadline = self.buffer.as_ref().map(|buffer| buffer.deadline);

            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Submit(job)) => self.on_submit(job),
                    Some(Request::WaitInitialized(waiter)) => self.on_wait_initialized(waiter),
                    Some(Request::Close(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = self.events_rx.recv() => self.on_worker_event(event),
                () = sleep_until(deadline) => self.flush_buffer(),
            }
        }
    }

    // =========================================================================
    // WORKER LIFECYCLE
    // =========================================================================

    fn start_workers(&mut self) {
        info!(pool_size = self.workers.len(), "Starting BLS verification workers");

        for worker in &mut self.workers {
            worker.status = WorkerStatus::Initializing;

            let worker_id = worker.id;
            let executor = Arc::clone(&self.executor);
            let events = self.events_tx.clone();
            self.init_tasks.push(tokio::spawn(async move {
                let result = executor.spawn(worker_id).await;
                let _ = events.send(WorkerEvent::Initialized { worker_id, result });
            }));
        }
    }

    fn on_worker_event(&mut self, event: WorkerEvent<E::Handle>) {
        match event {
            WorkerEvent::Initialized { worker_id, result } => {
                self.on_worker_initialized(worker_id, result)
            }
            WorkerEvent::WorkDone {
                worker_id,
                dispatched_at,
                outcome,
            } => self.on_work_done(worker_id, dispatched_at, outcome),
        }
    }

    fn on_worker_initialized(&mut self, worker_id: usize, result: Result<E::Handle, ExecutorError>) {
        let Some(worker) = self.workers.get_mut(worker_id) else {
            return;
        };

        worker.status = match result {
            Ok(handle) => {
                debug!(worker_id, "BLS worker initialized");
                WorkerStatus::Idle(handle)
            }
            Err(err) => {
                warn!(worker_id, error = %err, "BLS worker failed to initialize");
                WorkerStatus::InitializationError(err.to_string())
            }
        };

        if !self.initialization_pending() {
            let outcome = match self.initialization_failure() {
                Some(reason) => {
                    error!(reason = %reason, "Every BLS worker failed to initialize");
                    self.reject_all_pending(BlsPoolError::Initialization(reason.clone()));
                    Err(BlsPoolError::Initialization(reason))
                }
                None => Ok(()),
            };
            for waiter in self.init_waiters.drain(..) {
                let _ = waiter.send(outcome.clone());
            }
        }

        self.dispatch();
    }

    fn initialization_pending(&self) -> bool {
        self.workers.iter().any(|w| {
            matches!(
                w.status,
                WorkerStatus::NotInitialized | WorkerStatus::Initializing
            )
        })
    }

    /// `Some(reason)` when no worker can ever take work.
    fn initialization_failure(&self) -> Option<String> {
        let mut reason = None;
        for worker in &self.workers {
            match &worker.status {
                WorkerStatus::InitializationError(err) => {
                    reason.get_or_insert_with(|| err.clone());
                }
                _ => return None,
            }
        }
        reason
    }

    fn on_wait_initialized(&mut self, waiter: oneshot::Sender<Result<(), BlsPoolError>>) {
        if self.initialization_pending() {
            self.init_waiters.push(waiter);
            return;
        }
        let outcome = match self.initialization_failure() {
            Some(reason) => Err(BlsPoolError::Initialization(reason)),
            None => Ok(()),
        };
        let _ = waiter.send(outcome);
    }

    // =========================================================================
    // SUBMISSION & BUFFERING
    // =========================================================================

    fn on_submit(&mut self, job: Job) {
        if let Some(reason) = self.initialization_failure() {
            job.reject(BlsPoolError::Initialization(reason));
            return;
        }

        if job.opts().batchable {
            self.buffer_job(job);
        } else {
            self.queue.push(job);
            self.dispatch();
        }
    }

    fn buffer_job(&mut self, job: Job) {
        let max_buffer_wait = self.config.max_buffer_wait;
        let buffer = self.buffer.get_or_insert_with(|| {
            let now = Instant::now();
            BufferedBatchGroup::new(now, now + max_buffer_wait)
        });
        buffer.push(job);

        if buffer.should_flush(self.config.max_buffered_sigs) {
            self.flush_buffer();
        }
    }

    fn flush_buffer(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };

        debug!(
            jobs = buffer.job_count(),
            sigs = buffer.total_signature_count,
            waited_ms = buffer.first_push.elapsed().as_millis() as u64,
            "Flushing batch buffer"
        );
        buffer.flush_into(&mut self.queue);
        self.dispatch();
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    fn dispatch(&mut self) {
        while !self.shared.closed.load(Ordering::Acquire) && !self.queue.is_empty() {
            let Some((worker_id, handle)) = self.idle_worker() else {
                break;
            };
            let jobs = self
                .queue
                .take_work(self.config.max_signature_sets_per_job);
            if jobs.is_empty() {
                break;
            }
            self.start_job_group(worker_id, handle, jobs);
        }
        self.publish_queue_len();
    }

    fn idle_worker(&self) -> Option<(usize, E::Handle)> {
        self.workers.iter().find_map(|worker| match &worker.status {
            WorkerStatus::Idle(handle) => Some((worker.id, handle.clone())),
            _ => None,
        })
    }

    fn start_job_group(&mut self, worker_id: usize, handle: E::Handle, jobs: Vec<Job>) {
        let now = Instant::now();
        let request = self.build_request(&jobs);

        debug!(
            worker_id,
            jobs = jobs.len(),
            sigs = request.sig_count(),
            "Dispatching job group"
        );

        if let Some(metrics) = &self.metrics {
            metrics.total_jobs_groups_started.inc();
            for job in &jobs {
                let kind = job.kind().as_str();
                metrics
                    .job_wait_time
                    .observe(now.saturating_duration_since(job.added_at()).as_secs_f64());
                metrics.total_jobs_started.with_label_values(&[kind]).inc();
                metrics
                    .total_sig_sets_started
                    .with_label_values(&[kind])
                    .inc_by(job.sig_count() as f64);
            }
        }

        let executor = Arc::clone(&self.executor);
        let events = self.events_tx.clone();
        let call_handle = handle.clone();
        let task = tokio::spawn(async move {
            let outcome = executor.call(&call_handle, request).await;
            let _ = events.send(WorkerEvent::WorkDone {
                worker_id,
                dispatched_at: now,
                outcome,
            });
        });

        self.workers[worker_id].status = WorkerStatus::Running { handle, jobs, task };
        self.publish_workers_busy();
    }

    /// Jobs of one group are always of one kind.
    fn build_request(&self, jobs: &[Job]) -> WorkRequest {
        match jobs.first().map(Job::kind) {
            Some(JobKind::SameMessage) => WorkRequest::SameMessage {
                items: jobs
                    .iter()
                    .filter_map(|job| match job {
                        Job::SameMessage(job) => Some(SameMessageWorkItem {
                            message: job.message,
                            pairs: job.pairs.clone(),
                        }),
                        Job::Default(_) => None,
                    })
                    .collect(),
            },
            _ => WorkRequest::Default {
                items: jobs
                    .iter()
                    .filter_map(|job| match job {
                        Job::Default(job) => Some(DefaultWorkItem {
                            batchable: job.opts.batchable,
                            sets: job.sets.clone(),
                        }),
                        Job::SameMessage(_) => None,
                    })
                    .collect(),
                batchable_min_per_chunk: self.config.batchable_min_per_chunk,
            },
        }
    }

    // =========================================================================
    // RESULTS
    // =========================================================================

    fn on_work_done(
        &mut self,
        worker_id: usize,
        dispatched_at: Instant,
        outcome: Result<WorkResult, ExecutorError>,
    ) {
        let Some(worker) = self.workers.get_mut(worker_id) else {
            return;
        };
        let jobs = match mem::replace(&mut worker.status, WorkerStatus::NotInitialized) {
            WorkerStatus::Running { handle, jobs, .. } => {
                worker.status = WorkerStatus::Idle(handle);
                jobs
            }
            other => {
                worker.status = other;
                return;
            }
        };
        self.publish_workers_busy();

        match outcome {
            Ok(result) => self.settle_jobs(jobs, result, dispatched_at),
            Err(err) => {
                error!(worker_id, error = %err, "BLS worker call failed");
                for job in jobs {
                    self.record_job_error(&job);
                    job.reject(BlsPoolError::WorkerCommunication(err.to_string()));
                }
            }
        }

        self.dispatch();
    }

    fn settle_jobs(&mut self, jobs: Vec<Job>, result: WorkResult, dispatched_at: Instant) {
        if let Some(metrics) = &self.metrics {
            record_work_metrics(metrics, &jobs, &result, dispatched_at);
        }

        let mut results = result.results.into_iter();
        for (index, job) in jobs.into_iter().enumerate() {
            let Some(outcome) = results.next() else {
                self.record_job_error(&job);
                job.reject(BlsPoolError::WorkerCommunication(format!(
                    "No result for index {index}"
                )));
                continue;
            };

            match job {
                Job::Default(job) => match outcome {
                    Ok(valid) => {
                        if let Some(metrics) = &self.metrics {
                            metrics
                                .success_jobs_signature_sets
                                .inc_by(job.sets.len() as f64);
                        }
                        job.continuation.resolve(valid);
                    }
                    Err(err) => {
                        if let Some(metrics) = &self.metrics {
                            metrics
                                .error_aggregate_signature_sets
                                .with_label_values(&[JobKind::Default.as_str()])
                                .inc();
                            metrics.error_jobs_signature_sets.inc_by(job.sets.len() as f64);
                        }
                        job.continuation.reject(err.into());
                    }
                },
                Job::SameMessage(job) => match outcome {
                    Ok(true) => {
                        if let Some(metrics) = &self.metrics {
                            metrics
                                .success_jobs_signature_sets
                                .inc_by(job.pairs.len() as f64);
                        }
                        job.continuation.resolve(vec![true; job.pairs.len()]);
                    }
                    _ if job.pairs.len() == 1 => job.continuation.resolve(vec![false]),
                    _ => self.retry_same_message(job),
                },
            }
        }
    }

    /// Re-submit every pair of a failed same-message job as its own job.
    fn retry_same_message(&mut self, job: SameMessageJob) {
        debug!(
            pairs = job.pairs.len(),
            "Same-message check failed, verifying pairs individually"
        );
        if let Some(metrics) = &self.metrics {
            metrics.same_message_retry_jobs.inc();
            metrics.same_message_retry_sets.inc_by(job.pairs.len() as f64);
        }

        let now = Instant::now();
        let receivers: Vec<_> = job
            .pairs
            .iter()
            .map(|pair| {
                let (continuation, receiver) = Continuation::new();
                self.queue.push(Job::Default(DefaultJob {
                    sets: vec![pair.to_signature_set(job.message)],
                    opts: job.opts,
                    added_at: now,
                    continuation,
                }));
                receiver
            })
            .collect();

        let continuation = job.continuation;
        tokio::spawn(async move {
            let outcome = try_join_all(receivers.into_iter().map(await_outcome)).await;
            continuation.settle(outcome);
        });
    }

    fn record_job_error(&self, job: &Job) {
        if let Some(metrics) = &self.metrics {
            metrics.error_jobs_signature_sets.inc_by(job.sig_count() as f64);
        }
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    fn reject_all_pending(&mut self, error: BlsPoolError) {
        if let Some(buffer) = self.buffer.take() {
            for job in buffer.into_jobs() {
                job.reject(error.clone());
            }
        }
        for job in self.queue.drain() {
            job.reject(error.clone());
        }
        self.publish_queue_len();
    }

    async fn shutdown(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        info!("Closing BLS verification pool");

        self.reject_all_pending(BlsPoolError::Aborted);
        for task in self.init_tasks.drain(..) {
            task.abort();
        }

        let mut handles = Vec::new();
        for worker in &mut self.workers {
            match mem::replace(&mut worker.status, WorkerStatus::NotInitialized) {
                WorkerStatus::Idle(handle) => handles.push(handle),
                WorkerStatus::Running { handle, jobs, task } => {
                    task.abort();
                    for job in jobs {
                        job.reject(BlsPoolError::Aborted);
                    }
                    handles.push(handle);
                }
                _ => {}
            }
        }

        // Workers whose initialization finished while closing.
        while let Ok(event) = self.events_rx.try_recv() {
            if let WorkerEvent::Initialized {
                result: Ok(handle), ..
            } = event
            {
                handles.push(handle);
            }
        }

        for handle in handles {
            if let Err(err) = self.executor.terminate(handle).await {
                warn!(error = %err, "Failed to terminate BLS worker");
            }
        }

        self.publish_workers_busy();
        for waiter in self.init_waiters.drain(..) {
            let _ = waiter.send(Err(BlsPoolError::Aborted));
        }

        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            match request {
                Request::Submit(job) => job.reject(BlsPoolError::Aborted),
                Request::WaitInitialized(waiter) => {
                    let _ = waiter.send(Err(BlsPoolError::Aborted));
                }
                Request::Close(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    // =========================================================================
    // SHARED STATE
    // =========================================================================

    fn publish_queue_len(&self) {
        let len = self.queue.len();
        self.shared.queue_len.store(len, Ordering::Release);
        if let Some(metrics) = &self.metrics {
            metrics.queue_length.set(len as f64);
        }
    }

    fn publish_workers_busy(&self) {
        let busy = self
            .workers
            .iter()
            .filter(|w| matches!(w.status, WorkerStatus::Running { .. }))
            .count();
        self.shared.workers_busy.store(busy, Ordering::Release);
        if let Some(metrics) = &self.metrics {
            metrics.workers_busy.set(busy as f64);
        }
    }
}

fn record_work_metrics(
    metrics: &BlsPoolMetrics,
    jobs: &[Job],
    result: &WorkResult,
    dispatched_at: Instant,
) {
    let now = Instant::now();
    let worker_time = result
        .worker_end
        .saturating_duration_since(result.worker_start)
        .as_secs_f64();
    let sig_count: usize = jobs.iter().map(Job::sig_count).sum();

    let worker_id = result.worker_id.to_string();
    metrics
        .jobs_worker_time
        .with_label_values(&[worker_id.as_str()])
        .inc_by(worker_time);
    if sig_count > 0 {
        metrics
            .time_per_sig_set
            .observe(worker_time / sig_count as f64);
    }
    metrics.latency_to_worker.observe(
        result
            .worker_start
            .saturating_duration_since(dispatched_at)
            .as_secs_f64(),
    );
    metrics
        .latency_from_worker
        .observe(now.saturating_duration_since(result.worker_end).as_secs_f64());
    metrics.batch_retries.inc_by(result.batch_retries as f64);
    metrics
        .batch_sigs_success
        .inc_by(result.batch_sigs_success as f64);
}

/// Sleep until `deadline`, or forever when no deadline is armed.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
