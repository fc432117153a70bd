use std::sync::Arc;

use crate::{
    collector::Collect,
    config::{MetricsConfig, Role},
    error::Result,
    labels::LabelSet,
};

pub const JOBS_ENQUEUED_TOTAL: &str = "jobs_enqueued_total";
pub const JOBS_EXECUTED_TOTAL: &str = "jobs_executed_total";
pub const JOBS_SUCCESS_TOTAL: &str = "jobs_success_total";
pub const JOBS_FAILED_TOTAL: &str = "jobs_failed_total";
pub const JOB_RUNTIME_SECONDS: &str = "job_runtime_seconds";
pub const JOBS_WAITING_COUNT: &str = "jobs_waiting_count";
pub const JOBS_LATENCY: &str = "jobs_latency";
pub const ACTIVE_WORKERS_COUNT: &str = "active_workers_count";
pub const JOBS_SCHEDULED_COUNT: &str = "jobs_scheduled_count";
pub const JOBS_RETRY_COUNT: &str = "jobs_retry_count";
pub const JOBS_RETRY_BY_QUEUE_COUNT: &str = "jobs_retry_by_queue_count";
pub const JOBS_DEAD_COUNT: &str = "jobs_dead_count";
pub const ACTIVE_PROCESSES: &str = "active_processes";
pub const MEMORY_USAGE: &str = "memory_usage";

const JOB_LABELS: &[&str] = &["queue", "worker"];
const QUEUE_LABELS: &[&str] = &["queue"];

/// The metrics registry the instrumentation writes into.
///
/// Implementations must make updates safe under concurrent writers; the
/// interceptors call these methods from every job's task.
pub trait Metrics: Send + Sync + 'static {
    fn register_counter(&self, _name: &str, _help: &str, _labels: &[&str]) -> Result<()> {
        Ok(())
    }

    fn register_gauge(&self, _name: &str, _help: &str, _labels: &[&str]) -> Result<()> {
        Ok(())
    }

    fn register_histogram(
        &self,
        _name: &str,
        _help: &str,
        _labels: &[&str],
        _buckets: &[f64],
    ) -> Result<()> {
        Ok(())
    }

    /// Record a counter metric
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);

    /// Record a gauge metric (value that can go up and down)
    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Record one histogram observation
    fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Hook a collector into the registry's collection cycle.
    fn on_collect(&self, _collector: Arc<dyn Collect>) {}
}

#[derive(Debug, Clone, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment_counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}
    fn record_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
    fn observe_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

#[derive(Debug)]
struct MetricNames {
    jobs_enqueued: String,
    jobs_executed: String,
    jobs_success: String,
    jobs_failed: String,
    job_runtime: String,
    jobs_waiting: String,
    jobs_latency: String,
    active_workers: String,
    jobs_scheduled: String,
    jobs_retry: String,
    jobs_retry_by_queue: String,
    jobs_dead: String,
    active_processes: String,
    memory_usage: String,
}

impl MetricNames {
    fn new(config: &MetricsConfig) -> Self {
        Self {
            jobs_enqueued: config.metric_name(JOBS_ENQUEUED_TOTAL),
            jobs_executed: config.metric_name(JOBS_EXECUTED_TOTAL),
            jobs_success: config.metric_name(JOBS_SUCCESS_TOTAL),
            jobs_failed: config.metric_name(JOBS_FAILED_TOTAL),
            job_runtime: config.metric_name(JOB_RUNTIME_SECONDS),
            jobs_waiting: config.metric_name(JOBS_WAITING_COUNT),
            jobs_latency: config.metric_name(JOBS_LATENCY),
            active_workers: config.metric_name(ACTIVE_WORKERS_COUNT),
            jobs_scheduled: config.metric_name(JOBS_SCHEDULED_COUNT),
            jobs_retry: config.metric_name(JOBS_RETRY_COUNT),
            jobs_retry_by_queue: config.metric_name(JOBS_RETRY_BY_QUEUE_COUNT),
            jobs_dead: config.metric_name(JOBS_DEAD_COUNT),
            active_processes: config.metric_name(ACTIVE_PROCESSES),
            memory_usage: config.metric_name(MEMORY_USAGE),
        }
    }
}

/// The registered job metrics, shared by the interceptors and the collector.
#[derive(Clone)]
pub struct JobMetrics {
    registry: Arc<dyn Metrics>,
    names: Arc<MetricNames>,
}

impl JobMetrics {
    /// Registers every metric the configured role needs.
    pub fn register(registry: Arc<dyn Metrics>, config: &MetricsConfig) -> Result<Self> {
        let names = MetricNames::new(config);

        registry.register_counter(
            &names.jobs_enqueued,
            "A counter of the total number of jobs enqueued.",
            JOB_LABELS,
        )?;

        if config.role == Role::Server {
            registry.register_counter(
                &names.jobs_executed,
                "A counter of the total number of jobs executed.",
                JOB_LABELS,
            )?;
            registry.register_counter(
                &names.jobs_success,
                "A counter of the total number of jobs successfully processed.",
                JOB_LABELS,
            )?;
            registry.register_counter(
                &names.jobs_failed,
                "A counter of the total number of jobs failed.",
                JOB_LABELS,
            )?;
            registry.register_histogram(
                &names.job_runtime,
                "A histogram of the job execution time.",
                JOB_LABELS,
                &config.runtime_buckets,
            )?;
            registry.register_gauge(
                &names.jobs_waiting,
                "The number of jobs waiting to process.",
                QUEUE_LABELS,
            )?;
            registry.register_gauge(
                &names.jobs_latency,
                "The difference in seconds since the oldest job in the queue was enqueued.",
                QUEUE_LABELS,
            )?;
            registry.register_gauge(
                &names.active_workers,
                "The number of currently busy workers.",
                &[],
            )?;
            registry.register_gauge(
                &names.jobs_scheduled,
                "The number of jobs scheduled for later execution.",
                &[],
            )?;
            registry.register_gauge(
                &names.jobs_retry,
                "The number of failed jobs waiting to be retried.",
                &[],
            )?;
            registry.register_gauge(
                &names.jobs_dead,
                "The number of jobs that exceeded their retry count.",
                &[],
            )?;
            registry.register_gauge(
                &names.active_processes,
                "The number of active worker processes.",
                &[],
            )?;
            registry.register_gauge(
                &names.memory_usage,
                "The resident memory of this process in bytes.",
                &[],
            )?;

            if config.collect_retries_by_queue {
                registry.register_gauge(
                    &names.jobs_retry_by_queue,
                    "The number of failed jobs waiting to be retried, per queue.",
                    QUEUE_LABELS,
                )?;
            }
        }

        Ok(Self {
            registry,
            names: Arc::new(names),
        })
    }

    pub fn registry(&self) -> &Arc<dyn Metrics> {
        &self.registry
    }

    pub fn record_job_enqueued(&self, labels: &LabelSet<'_>) {
        self.registry
            .increment_counter(&self.names.jobs_enqueued, 1, &labels.as_pairs());
    }

    pub fn record_job_executed(&self, labels: &LabelSet<'_>) {
        self.registry
            .increment_counter(&self.names.jobs_executed, 1, &labels.as_pairs());
    }

    pub fn record_job_succeeded(&self, labels: &LabelSet<'_>) {
        self.registry
            .increment_counter(&self.names.jobs_success, 1, &labels.as_pairs());
    }

    pub fn record_job_failed(&self, labels: &LabelSet<'_>) {
        self.registry
            .increment_counter(&self.names.jobs_failed, 1, &labels.as_pairs());
    }

    pub fn record_job_runtime(&self, labels: &LabelSet<'_>, seconds: f64) {
        self.registry
            .observe_histogram(&self.names.job_runtime, seconds, &labels.as_pairs());
    }

    pub fn record_jobs_waiting(&self, queue: &str, count: u64) {
        self.registry
            .record_gauge(&self.names.jobs_waiting, count as f64, &[("queue", queue)]);
    }

    pub fn record_jobs_latency(&self, queue: &str, seconds: f64) {
        self.registry
            .record_gauge(&self.names.jobs_latency, seconds, &[("queue", queue)]);
    }

    pub fn record_retries_by_queue(&self, queue: &str, count: u64) {
        self.registry.record_gauge(
            &self.names.jobs_retry_by_queue,
            count as f64,
            &[("queue", queue)],
        );
    }

    pub fn record_active_workers(&self, count: u64) {
        self.registry
            .record_gauge(&self.names.active_workers, count as f64, &[]);
    }

    pub fn record_jobs_scheduled(&self, count: u64) {
        self.registry
            .record_gauge(&self.names.jobs_scheduled, count as f64, &[]);
    }

    pub fn record_jobs_retry(&self, count: u64) {
        self.registry
            .record_gauge(&self.names.jobs_retry, count as f64, &[]);
    }

    pub fn record_jobs_dead(&self, count: u64) {
        self.registry
            .record_gauge(&self.names.jobs_dead, count as f64, &[]);
    }

    pub fn record_active_processes(&self, count: u64) {
        self.registry
            .record_gauge(&self.names.active_processes, count as f64, &[]);
    }

    pub fn record_memory_usage(&self, bytes: u64) {
        self.registry
            .record_gauge(&self.names.memory_usage, bytes as f64, &[]);
    }
}

impl std::fmt::Debug for JobMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMetrics")
            .field("names", &self.names)
            .field("registry", &"<dyn Metrics>")
            .finish()
    }
}
