//! # Jobs, Queue and Batch Buffer
//!
//! A [`Job`] is the unit of scheduling. It is created at submission, waits in
//! the [`BufferedBatchGroup`] or the [`JobQueue`], is consumed by exactly one
//! dispatch and is destroyed when its [`Continuation`] fires.

use super::entities::{PublicKeySignaturePair, SignatureSet, SigningRoot, VerifyOpts};
use super::errors::BlsPoolError;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot;

// =============================================================================
// CONTINUATION
// =============================================================================

/// One-shot resolve/reject handle for a job.
///
/// Both methods consume the handle, so a continuation can fire at most once.
/// If the caller stopped waiting, the outcome is dropped silently.
pub struct Continuation<T> {
    sender: oneshot::Sender<Result<T, BlsPoolError>>,
}

impl<T> Continuation<T> {
    /// Create a continuation and the receiver its outcome will arrive on.
    pub fn new() -> (Self, oneshot::Receiver<Result<T, BlsPoolError>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn resolve(self, value: T) {
        let _ = self.sender.send(Ok(value));
    }

    pub fn reject(self, error: BlsPoolError) {
        let _ = self.sender.send(Err(error));
    }

    /// Forward an already computed outcome.
    pub fn settle(self, outcome: Result<T, BlsPoolError>) {
        let _ = self.sender.send(outcome);
    }
}

/// Wait for a continuation to fire. A dropped continuation means the pool
/// went away before the job ran.
pub async fn await_outcome<T>(
    receiver: oneshot::Receiver<Result<T, BlsPoolError>>,
) -> Result<T, BlsPoolError> {
    receiver.await.unwrap_or(Err(BlsPoolError::Aborted))
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// Discriminant of a [`Job`], used to keep one dispatch homogeneous.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobKind {
    Default,
    SameMessage,
}

impl JobKind {
    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Default => "default",
            JobKind::SameMessage => "same_message",
        }
    }
}

/// Succeeds iff every set verifies.
#[derive(Debug)]
pub struct DefaultJob {
    pub sets: Vec<SignatureSet>,
    pub opts: VerifyOpts,
    pub added_at: Instant,
    pub continuation: Continuation<bool>,
}

/// One result per pair, all checked against `message`.
#[derive(Debug)]
pub struct SameMessageJob {
    pub message: SigningRoot,
    pub pairs: Vec<PublicKeySignaturePair>,
    pub opts: VerifyOpts,
    pub added_at: Instant,
    pub continuation: Continuation<Vec<bool>>,
}

#[derive(Debug)]
pub enum Job {
    Default(DefaultJob),
    SameMessage(SameMessageJob),
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::Default(_) => JobKind::Default,
            Job::SameMessage(_) => JobKind::SameMessage,
        }
    }

    pub fn opts(&self) -> VerifyOpts {
        match self {
            Job::Default(job) => job.opts,
            Job::SameMessage(job) => job.opts,
        }
    }

    pub fn added_at(&self) -> Instant {
        match self {
            Job::Default(job) => job.added_at,
            Job::SameMessage(job) => job.added_at,
        }
    }

    /// Signature count used for buffering and dispatch budgets.
    pub fn sig_count(&self) -> usize {
        match self {
            Job::Default(job) => job.sets.len(),
            Job::SameMessage(job) => job.pairs.len(),
        }
    }

    pub fn reject(self, error: BlsPoolError) {
        match self {
            Job::Default(job) => job.continuation.reject(error),
            Job::SameMessage(job) => job.continuation.reject(error),
        }
    }
}

// =============================================================================
// QUEUE
// =============================================================================

/// FIFO job queue with a priority lane at its head.
///
/// Priority jobs are inserted behind earlier priority jobs but ahead of every
/// non-priority job, so both classes stay FIFO.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
    /// Length of the leading run of priority jobs
    priority_len: usize,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue according to the job's own priority flag.
    pub fn push(&mut self, job: Job) {
        if job.opts().priority {
            self.push_priority(job);
        } else {
            self.push_back(job);
        }
    }

    pub fn push_back(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    pub fn push_priority(&mut self, job: Job) {
        self.jobs.insert(self.priority_len, job);
        self.priority_len += 1;
    }

    pub fn pop_front(&mut self) -> Option<Job> {
        let job = self.jobs.pop_front()?;
        self.priority_len = self.priority_len.saturating_sub(1);
        Some(job)
    }

    pub fn front(&self) -> Option<&Job> {
        self.jobs.front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove every queued job, in queue order.
    pub fn drain(&mut self) -> impl Iterator<Item = Job> + '_ {
        self.priority_len = 0;
        self.jobs.drain(..)
    }

    /// Pull jobs from the front up to a signature budget.
    ///
    /// Gathering stops once `max_sigs` is reached or when the head job is of a
    /// different kind than the jobs already gathered: one executor call never
    /// mixes kinds. A single job larger than the budget is still taken alone.
    pub fn take_work(&mut self, max_sigs: usize) -> Vec<Job> {
        let mut taken = Vec::new();
        let mut total_sigs = 0;
        let mut kind = None;

        while total_sigs < max_sigs {
            let Some(head) = self.front() else {
                break;
            };
            if kind.is_some_and(|k| k != head.kind()) {
                break;
            }
            kind = Some(head.kind());

            if let Some(job) = self.pop_front() {
                total_sigs += job.sig_count();
                taken.push(job);
            }
        }

        taken
    }
}

// =============================================================================
// BATCH BUFFER
// =============================================================================

/// Batchable jobs accumulating before being released to the queue.
///
/// Exists only while accumulating. The owner arms a flush at `deadline` and
/// flushes early once [`BufferedBatchGroup::should_flush`] holds.
#[derive(Debug)]
pub struct BufferedBatchGroup {
    pub normal_jobs: Vec<Job>,
    pub priority_jobs: Vec<Job>,
    pub total_signature_count: usize,
    pub first_push: Instant,
    pub deadline: Instant,
}

impl BufferedBatchGroup {
    pub fn new(now: Instant, deadline: Instant) -> Self {
        Self {
            normal_jobs: Vec::new(),
            priority_jobs: Vec::new(),
            total_signature_count: 0,
            first_push: now,
            deadline,
        }
    }

    pub fn push(&mut self, job: Job) {
        self.total_signature_count += job.sig_count();
        if job.opts().priority {
            self.priority_jobs.push(job);
        } else {
            self.normal_jobs.push(job);
        }
    }

    pub fn should_flush(&self, max_buffered_sigs: usize) -> bool {
        self.total_signature_count > max_buffered_sigs
    }

    pub fn job_count(&self) -> usize {
        self.normal_jobs.len() + self.priority_jobs.len()
    }

    /// Release buffered jobs: priority jobs to the front lane, the rest to the back.
    pub fn flush_into(self, queue: &mut JobQueue) {
        for job in self.priority_jobs {
            queue.push_priority(job);
        }
        for job in self.normal_jobs {
            queue.push_back(job);
        }
    }

    /// Every job held, priority first.
    pub fn into_jobs(self) -> impl Iterator<Item = Job> {
        self.priority_jobs.into_iter().chain(self.normal_jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{BlsPublicKey, BlsSignature};
    use std::time::Duration;

    fn set() -> SignatureSet {
        SignatureSet::single(
            BlsPublicKey::from_bytes([1u8; 48]),
            [0u8; 32],
            BlsSignature::from_bytes([2u8; 96]),
        )
    }

    fn default_job(sets: usize, opts: VerifyOpts) -> (Job, oneshot::Receiver<Result<bool, BlsPoolError>>) {
        let (continuation, rx) = Continuation::new();
        let job = Job::Default(DefaultJob {
            sets: vec![set(); sets],
            opts,
            added_at: Instant::now(),
            continuation,
        });
        (job, rx)
    }

    fn same_message_job(pairs: usize) -> Job {
        let (continuation, _rx) = Continuation::new();
        Job::SameMessage(SameMessageJob {
            message: [7u8; 32],
            pairs: vec![
                PublicKeySignaturePair::new(
                    BlsPublicKey::from_bytes([1u8; 48]),
                    BlsSignature::from_bytes([2u8; 96]),
                );
                pairs
            ],
            opts: VerifyOpts::default(),
            added_at: Instant::now(),
            continuation,
        })
    }

    #[test]
    fn test_continuation_delivers_once() {
        let (continuation, mut rx) = Continuation::<bool>::new();
        continuation.resolve(true);
        assert_eq!(rx.try_recv().unwrap(), Ok(true));
    }

    #[test]
    fn test_continuation_reject() {
        let (job, mut rx) = default_job(1, VerifyOpts::default());
        job.reject(BlsPoolError::Aborted);
        assert_eq!(rx.try_recv().unwrap(), Err(BlsPoolError::Aborted));
    }

    #[test]
    fn test_queue_priority_lane_is_fifo() {
        let mut queue = JobQueue::new();
        let prio = VerifyOpts::default().with_priority(true);

        queue.push(default_job(1, VerifyOpts::default()).0); // n1
        queue.push(default_job(2, prio).0); // p1
        queue.push(default_job(3, VerifyOpts::default()).0); // n2
        queue.push(default_job(4, prio).0); // p2

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop_front())
            .map(|j| j.sig_count())
            .collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_priority_lane_resets_after_pops() {
        let mut queue = JobQueue::new();
        let prio = VerifyOpts::default().with_priority(true);

        queue.push(default_job(1, prio).0);
        queue.push(default_job(2, VerifyOpts::default()).0);
        assert_eq!(queue.pop_front().map(|j| j.sig_count()), Some(1));

        // The lane is empty again, so the next priority job goes to the very front.
        queue.push(default_job(3, prio).0);
        assert_eq!(queue.pop_front().map(|j| j.sig_count()), Some(3));
        assert_eq!(queue.pop_front().map(|j| j.sig_count()), Some(2));
    }

    #[test]
    fn test_take_work_respects_budget() {
        let mut queue = JobQueue::new();
        for _ in 0..5 {
            queue.push(default_job(50, VerifyOpts::default()).0);
        }

        let work = queue.take_work(128);
        // 50 + 50 = 100 < 128, so a third job is taken (150 total).
        assert_eq!(work.len(), 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_take_work_does_not_mix_kinds() {
        let mut queue = JobQueue::new();
        queue.push(default_job(1, VerifyOpts::default()).0);
        queue.push(default_job(1, VerifyOpts::default()).0);
        queue.push(same_message_job(3));
        queue.push(default_job(1, VerifyOpts::default()).0);

        let first = queue.take_work(128);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|j| j.kind() == JobKind::Default));

        let second = queue.take_work(128);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind(), JobKind::SameMessage);

        assert_eq!(queue.take_work(128).len(), 1);
        assert!(queue.take_work(128).is_empty());
    }

    #[test]
    fn test_buffer_flush_threshold() {
        let now = Instant::now();
        let mut buffer = BufferedBatchGroup::new(now, now + Duration::from_millis(100));
        for _ in 0..32 {
            buffer.push(default_job(1, VerifyOpts::batchable()).0);
        }
        assert!(!buffer.should_flush(32));

        buffer.push(default_job(1, VerifyOpts::batchable()).0);
        assert!(buffer.should_flush(32));
        assert_eq!(buffer.job_count(), 33);
    }

    #[test]
    fn test_buffer_flush_order() {
        let now = Instant::now();
        let mut buffer = BufferedBatchGroup::new(now, now);
        let prio = VerifyOpts::batchable().with_priority(true);

        buffer.push(default_job(1, VerifyOpts::batchable()).0);
        buffer.push(default_job(2, prio).0);
        buffer.push(default_job(3, prio).0);

        let mut queue = JobQueue::new();
        queue.push(default_job(9, VerifyOpts::default()).0);
        buffer.flush_into(&mut queue);

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop_front())
            .map(|j| j.sig_count())
            .collect();
        assert_eq!(order, vec![2, 3, 9, 1]);
    }
}
