//! Prometheus metrics for the BLS verification pool (Subsystem 10).
//!
//! All metrics follow the naming convention: `qc_bls_pool_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., sig_sets_total)
//! - **Gauge**: Value that can go up or down (e.g., queue_length)
//! - **Histogram**: Distribution of values (e.g., job_wait_time_seconds)
//!
//! Metrics are registered into a caller supplied [`Registry`] rather than a
//! global one, so several pools (and parallel tests) can coexist.

use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

use crate::TelemetryError;

/// Metric set of one verification pool.
#[derive(Clone)]
pub struct BlsPoolMetrics {
    // =========================================================================
    // QUEUE / WORKERS
    // =========================================================================
    /// Jobs waiting in the queue
    pub queue_length: Gauge,
    /// Workers currently running a job group
    pub workers_busy: Gauge,
    /// Time from enqueue to dispatch
    pub job_wait_time: Histogram,
    /// Job groups sent to workers
    pub total_jobs_groups_started: Counter,
    /// Jobs sent to workers, by job type
    pub total_jobs_started: CounterVec,
    /// Signature sets sent to workers, by job type
    pub total_sig_sets_started: CounterVec,

    // =========================================================================
    // SUBMISSIONS
    // =========================================================================
    pub total_sig_sets: Counter,
    pub prioritized_sig_sets: Counter,
    pub batchable_sig_sets: Counter,
    /// Participant keys submitted for aggregation
    pub aggregated_pubkeys: Counter,
    /// Verifications run on the calling task
    pub main_thread_duration: Histogram,

    // =========================================================================
    // WORKER TIMING
    // =========================================================================
    /// Worker time divided by set count
    pub time_per_sig_set: Histogram,
    /// Busy time per worker
    pub jobs_worker_time: CounterVec,
    /// From dispatch to the worker starting on the request
    pub latency_to_worker: Histogram,
    /// From the worker finishing to the result reaching the dispatcher
    pub latency_from_worker: Histogram,

    // =========================================================================
    // OUTCOMES
    // =========================================================================
    pub success_jobs_signature_sets: Counter,
    pub error_jobs_signature_sets: Counter,
    /// Jobs rejected because aggregation or decoding failed, by job type
    pub error_aggregate_signature_sets: CounterVec,
    /// Failed combined batch checks re-verified set by set
    pub batch_retries: Counter,
    /// Sets confirmed by a successful combined batch check
    pub batch_sigs_success: Counter,
    pub same_message_retry_jobs: Counter,
    pub same_message_retry_sets: Counter,
}

impl BlsPoolMetrics {
    /// Create every collector and register it in `registry`.
    pub fn new(registry: &Registry) -> Result<Self, TelemetryError> {
        let metrics = Self {
            queue_length: Gauge::new("qc_bls_pool_queue_length", "Jobs waiting in the queue")
                .map_err(init_err)?,
            workers_busy: Gauge::new(
                "qc_bls_pool_workers_busy",
                "Workers currently verifying a job group",
            )
            .map_err(init_err)?,
            job_wait_time: histogram(
                "qc_bls_pool_job_wait_time_seconds",
                "Time from enqueue to dispatch",
                0.001,
            )?,
            total_jobs_groups_started: Counter::new(
                "qc_bls_pool_job_groups_started_total",
                "Job groups sent to workers",
            )
            .map_err(init_err)?,
            total_jobs_started: CounterVec::new(
                Opts::new("qc_bls_pool_jobs_started_total", "Jobs sent to workers"),
                &["type"], // type: default/same_message
            )
            .map_err(init_err)?,
            total_sig_sets_started: CounterVec::new(
                Opts::new(
                    "qc_bls_pool_sig_sets_started_total",
                    "Signature sets sent to workers",
                ),
                &["type"],
            )
            .map_err(init_err)?,
            total_sig_sets: Counter::new(
                "qc_bls_pool_sig_sets_total",
                "Signature sets submitted for verification",
            )
            .map_err(init_err)?,
            prioritized_sig_sets: Counter::new(
                "qc_bls_pool_prioritized_sig_sets_total",
                "Signature sets submitted with priority",
            )
            .map_err(init_err)?,
            batchable_sig_sets: Counter::new(
                "qc_bls_pool_batchable_sig_sets_total",
                "Signature sets submitted as batchable",
            )
            .map_err(init_err)?,
            aggregated_pubkeys: Counter::new(
                "qc_bls_pool_aggregated_pubkeys_total",
                "Participant public keys submitted for aggregation",
            )
            .map_err(init_err)?,
            main_thread_duration: histogram(
                "qc_bls_pool_main_thread_duration_seconds",
                "Time spent verifying on the calling task",
                0.0001,
            )?,
            time_per_sig_set: histogram(
                "qc_bls_pool_time_per_sig_set_seconds",
                "Worker time per signature set",
                0.00001,
            )?,
            jobs_worker_time: CounterVec::new(
                Opts::new(
                    "qc_bls_pool_worker_time_seconds_total",
                    "Busy time per worker",
                ),
                &["worker_id"],
            )
            .map_err(init_err)?,
            latency_to_worker: histogram(
                "qc_bls_pool_latency_to_worker_seconds",
                "Time from dispatch to the worker starting",
                0.0001,
            )?,
            latency_from_worker: histogram(
                "qc_bls_pool_latency_from_worker_seconds",
                "Time from the worker finishing to the dispatcher",
                0.0001,
            )?,
            success_jobs_signature_sets: Counter::new(
                "qc_bls_pool_success_sig_sets_total",
                "Signature sets of jobs that resolved",
            )
            .map_err(init_err)?,
            error_jobs_signature_sets: Counter::new(
                "qc_bls_pool_error_sig_sets_total",
                "Signature sets of jobs that were rejected",
            )
            .map_err(init_err)?,
            error_aggregate_signature_sets: CounterVec::new(
                Opts::new(
                    "qc_bls_pool_error_aggregate_sig_sets_total",
                    "Jobs rejected while preparing crypto inputs",
                ),
                &["type"],
            )
            .map_err(init_err)?,
            batch_retries: Counter::new(
                "qc_bls_pool_batch_retries_total",
                "Failed batch checks re-verified individually",
            )
            .map_err(init_err)?,
            batch_sigs_success: Counter::new(
                "qc_bls_pool_batch_sigs_success_total",
                "Signature sets confirmed by a batch check",
            )
            .map_err(init_err)?,
            same_message_retry_jobs: Counter::new(
                "qc_bls_pool_same_message_retry_jobs_total",
                "Same-message jobs retried per pair",
            )
            .map_err(init_err)?,
            same_message_retry_sets: Counter::new(
                "qc_bls_pool_same_message_retry_sets_total",
                "Pairs re-submitted after a failed same-message check",
            )
            .map_err(init_err)?,
        };

        metrics.register(registry)?;
        Ok(metrics)
    }

    fn register(&self, registry: &Registry) -> Result<(), TelemetryError> {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            // Queue / workers
            Box::new(self.queue_length.clone()),
            Box::new(self.workers_busy.clone()),
            Box::new(self.job_wait_time.clone()),
            Box::new(self.total_jobs_groups_started.clone()),
            Box::new(self.total_jobs_started.clone()),
            Box::new(self.total_sig_sets_started.clone()),
            // Submissions
            Box::new(self.total_sig_sets.clone()),
            Box::new(self.prioritized_sig_sets.clone()),
            Box::new(self.batchable_sig_sets.clone()),
            Box::new(self.aggregated_pubkeys.clone()),
            Box::new(self.main_thread_duration.clone()),
            // Worker timing
            Box::new(self.time_per_sig_set.clone()),
            Box::new(self.jobs_worker_time.clone()),
            Box::new(self.latency_to_worker.clone()),
            Box::new(self.latency_from_worker.clone()),
            // Outcomes
            Box::new(self.success_jobs_signature_sets.clone()),
            Box::new(self.error_jobs_signature_sets.clone()),
            Box::new(self.error_aggregate_signature_sets.clone()),
            Box::new(self.batch_retries.clone()),
            Box::new(self.batch_sigs_success.clone()),
            Box::new(self.same_message_retry_jobs.clone()),
            Box::new(self.same_message_retry_sets.clone()),
        ];

        for collector in collectors {
            registry.register(collector).map_err(init_err)?;
        }
        Ok(())
    }
}

fn histogram(name: &str, help: &str, start: f64) -> Result<Histogram, TelemetryError> {
    let buckets = exponential_buckets(start, 2.0, 15).map_err(init_err)?;
    Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets)).map_err(init_err)
}

fn init_err(err: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsInit(err.to_string())
}

/// Encode all metrics of `registry` as Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(init_err)?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        let registry = Registry::new();
        assert!(BlsPoolMetrics::new(&registry).is_ok());
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let _first = BlsPoolMetrics::new(&registry).unwrap();
        assert!(matches!(
            BlsPoolMetrics::new(&registry),
            Err(TelemetryError::MetricsInit(_))
        ));
    }

    #[test]
    fn test_counter_increment() {
        let registry = Registry::new();
        let metrics = BlsPoolMetrics::new(&registry).unwrap();
        metrics.batch_retries.inc();
        metrics.total_jobs_started.with_label_values(&["default"]).inc_by(3.0);

        assert_eq!(metrics.batch_retries.get(), 1.0);
        assert_eq!(
            metrics.total_jobs_started.with_label_values(&["default"]).get(),
            3.0
        );
    }

    #[test]
    fn test_gauge_set() {
        let registry = Registry::new();
        let metrics = BlsPoolMetrics::new(&registry).unwrap();
        metrics.queue_length.set(42.0);
        assert_eq!(metrics.queue_length.get(), 42.0);
    }

    #[test]
    fn test_histogram_timer() {
        let registry = Registry::new();
        let metrics = BlsPoolMetrics::new(&registry).unwrap();
        {
            let _timer = time_histogram!(metrics.main_thread_duration);
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(metrics.main_thread_duration.get_sample_count(), 1);
    }

    #[test]
    fn test_encode_metrics() {
        let registry = Registry::new();
        let metrics = BlsPoolMetrics::new(&registry).unwrap();
        metrics.total_sig_sets.inc_by(5.0);

        let text = encode_metrics(&registry).unwrap();
        assert!(text.contains("qc_bls_pool_sig_sets_total 5"));
    }
}
