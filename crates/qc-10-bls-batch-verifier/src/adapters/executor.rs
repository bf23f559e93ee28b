//! # Compute Executors
//!
//! Two in-process implementations of [`ComputeExecutor`]. Both run
//! [`run_work_requests`] off the async runtime so the dispatcher task never
//! blocks on pairing math.
//!
//! | Executor | Execution unit | Handle |
//! |----------|----------------|--------|
//! | [`BlockingExecutor`] | tokio blocking pool | worker id |
//! | [`RayonExecutor`] | one dedicated rayon thread per worker | [`RayonWorker`] |

use crate::domain::errors::ExecutorError;
use crate::domain::work::{run_work_requests, WorkRequest, WorkResult};
use crate::ports::outbound::{BlsCrypto, ComputeExecutor};
use async_trait::async_trait;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

// =============================================================================
// BLOCKING EXECUTOR
// =============================================================================

/// Runs every request on tokio's blocking thread pool.
///
/// Workers share the blocking pool, so `pool_size` alone bounds concurrency.
pub struct BlockingExecutor<C: BlsCrypto + ?Sized> {
    crypto: Arc<C>,
}

impl<C: BlsCrypto + ?Sized> BlockingExecutor<C> {
    pub fn new(crypto: Arc<C>) -> Self {
        Self { crypto }
    }
}

#[async_trait]
impl<C: BlsCrypto + ?Sized> ComputeExecutor for BlockingExecutor<C> {
    type Handle = usize;

    async fn spawn(&self, worker_id: usize) -> Result<usize, ExecutorError> {
        Ok(worker_id)
    }

    async fn call(
        &self,
        worker_id: &usize,
        request: WorkRequest,
    ) -> Result<WorkResult, ExecutorError> {
        let crypto = Arc::clone(&self.crypto);
        let worker_id = *worker_id;

        tokio::task::spawn_blocking(move || run_work_requests(&*crypto, worker_id, request))
            .await
            .map_err(|e| ExecutorError::CallFailed(e.to_string()))
    }

    async fn terminate(&self, _worker_id: usize) -> Result<(), ExecutorError> {
        Ok(())
    }
}

// =============================================================================
// RAYON EXECUTOR
// =============================================================================

/// Gives every worker its own single-threaded rayon pool.
///
/// Verification threads stay pinned to their worker and never compete with
/// tokio's blocking pool. Terminating a worker drops its pool; the thread
/// exits once its current request is done.
pub struct RayonExecutor<C: BlsCrypto + ?Sized> {
    crypto: Arc<C>,
}

impl<C: BlsCrypto + ?Sized> RayonExecutor<C> {
    pub fn new(crypto: Arc<C>) -> Self {
        Self { crypto }
    }
}

/// Handle of one rayon-backed worker.
#[derive(Clone)]
pub struct RayonWorker {
    id: usize,
    pool: Arc<ThreadPool>,
}

impl RayonWorker {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl<C: BlsCrypto + ?Sized> ComputeExecutor for RayonExecutor<C> {
    type Handle = RayonWorker;

    async fn spawn(&self, worker_id: usize) -> Result<RayonWorker, ExecutorError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(move |_| format!("bls-worker-{worker_id}"))
            .panic_handler(move |_| error!(worker_id, "BLS worker panicked"))
            .build()
            .map_err(|e| ExecutorError::SpawnFailed(e.to_string()))?;

        debug!(worker_id, "Rayon worker started");
        Ok(RayonWorker {
            id: worker_id,
            pool: Arc::new(pool),
        })
    }

    async fn call(
        &self,
        worker: &RayonWorker,
        request: WorkRequest,
    ) -> Result<WorkResult, ExecutorError> {
        let crypto = Arc::clone(&self.crypto);
        let worker_id = worker.id;
        let (tx, rx) = oneshot::channel();

        worker.pool.spawn(move || {
            let _ = tx.send(run_work_requests(&*crypto, worker_id, request));
        });

        // A panic drops `tx` without sending.
        rx.await
            .map_err(|_| ExecutorError::CallFailed(format!("worker {worker_id} dropped the request")))
    }

    async fn terminate(&self, worker: RayonWorker) -> Result<(), ExecutorError> {
        debug!(worker_id = worker.id, "Rayon worker stopped");
        drop(worker.pool);
        Ok(())
    }
}
