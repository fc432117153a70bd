#![allow(dead_code)]

use async_trait::async_trait;
use queue_metrics::{
    error::{MetricsError, Result},
    labels::{JobInvocation, WorkerRef},
    metrics::Metrics,
    middleware::{ClientMiddleware, ExecutionInterceptor, ServerMiddleware, SubmissionInterceptor},
    stats::{BackendSnapshot, StatsSource},
};
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Once;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initializes logging for integration tests with a consistent configuration.
/// This function is safe to call multiple times as it will only initialize logging once.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("queue_metrics=debug,redis=debug,test=debug"));

        let json_layer = fmt::layer()
            .json()
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true);

        use tracing_subscriber::layer::SubscriberExt;
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .try_init();
    });
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Observation(f64),
}

#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub name: String,
    pub value: MetricValue,
    pub labels: Vec<(String, String)>,
}

/// Registry that keeps every write so tests can read counters back.
#[derive(Debug, Default)]
pub struct FakeMetricsCollector {
    records: std::sync::Mutex<Vec<MetricRecord>>,
    registered: std::sync::Mutex<Vec<String>>,
}

impl FakeMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn labels_match(a: &[(String, String)], b: &[(&str, &str)]) -> bool {
        a.len() == b.len()
            && b.iter()
                .all(|(k, v)| a.iter().any(|(k2, v2)| k2 == k && v2 == v))
    }

    /// Sum of all increments for the exact label set.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name && Self::labels_match(&r.labels, labels))
            .map(|r| match r.value {
                MetricValue::Counter(value) => value,
                _ => 0,
            })
            .sum()
    }

    /// Sum of all increments regardless of labels.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name)
            .map(|r| match r.value {
                MetricValue::Counter(value) => value,
                _ => 0,
            })
            .sum()
    }

    /// Last value written for the exact label set.
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.name == name && Self::labels_match(&r.labels, labels))
            .and_then(|r| match r.value {
                MetricValue::Gauge(value) => Some(value),
                _ => None,
            })
    }

    pub fn observations(&self, name: &str, labels: &[(&str, &str)]) -> Vec<f64> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name && Self::labels_match(&r.labels, labels))
            .filter_map(|r| match r.value {
                MetricValue::Observation(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.lock().unwrap().iter().any(|n| n == name)
    }

    fn push(&self, name: &str, value: MetricValue, labels: &[(&str, &str)]) {
        self.records.lock().unwrap().push(MetricRecord {
            name: name.to_string(),
            value,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}

impl Metrics for FakeMetricsCollector {
    fn register_counter(&self, name: &str, _help: &str, _labels: &[&str]) -> Result<()> {
        self.registered.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn register_gauge(&self, name: &str, _help: &str, _labels: &[&str]) -> Result<()> {
        self.registered.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn register_histogram(
        &self,
        name: &str,
        _help: &str,
        _labels: &[&str],
        _buckets: &[f64],
    ) -> Result<()> {
        self.registered.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        self.push(name, MetricValue::Counter(value), labels);
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.push(name, MetricValue::Gauge(value), labels);
    }

    fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.push(name, MetricValue::Observation(value), labels);
    }
}

/// Stats source serving a fixed snapshot, optionally failing on one queue's latency.
#[derive(Debug, Default)]
pub struct FakeStats {
    pub snapshot: BackendSnapshot,
    pub latencies: BTreeMap<String, f64>,
    pub retries: Option<BTreeMap<String, u64>>,
    pub failing_latency_queue: Option<String>,
    pub snapshot_unavailable: bool,
}

impl FakeStats {
    pub fn with_queues(queues: &[(&str, u64)]) -> Self {
        let mut stats = Self::default();
        for (queue, size) in queues {
            stats.snapshot.queues.insert(queue.to_string(), *size);
            stats.latencies.insert(queue.to_string(), 0.0);
        }
        stats
    }
}

#[async_trait]
impl StatsSource for FakeStats {
    async fn snapshot(&self) -> Result<BackendSnapshot> {
        if self.snapshot_unavailable {
            return Err(MetricsError::ConnectionError("store unreachable".to_string()));
        }
        Ok(self.snapshot.clone())
    }

    async fn queue_latency(&self, queue: &str) -> Result<f64> {
        if self.failing_latency_queue.as_deref() == Some(queue) {
            return Err(MetricsError::ConnectionError(format!(
                "lost connection reading {queue}"
            )));
        }
        Ok(self.latencies.get(queue).copied().unwrap_or(0.0))
    }

    async fn retries_by_queue(&self) -> Result<BTreeMap<String, u64>> {
        self.retries
            .clone()
            .ok_or_else(|| MetricsError::Unsupported("retries by queue".to_string()))
    }
}

/// A queued job as a tiny in-memory backend stores it.
#[derive(Debug, Clone)]
pub struct TestJob {
    pub worker: &'static str,
    pub wrapped: bool,
    pub queue: String,
    pub payload: Value,
    pub should_fail: bool,
    pub duration: Duration,
}

impl TestJob {
    pub fn new(worker: &'static str, queue: &str) -> Self {
        Self {
            worker,
            wrapped: false,
            queue: queue.to_string(),
            payload: json!({ "queue": queue }),
            should_fail: false,
            duration: Duration::from_millis(0),
        }
    }

    /// Enqueue through the generic adapter, which records the inner class as `wrapped`.
    pub fn wrapped(worker: &'static str, queue: &str) -> Self {
        Self {
            wrapped: true,
            payload: json!({ "queue": queue, "wrapped": worker }),
            ..Self::new(worker, queue)
        }
    }

    pub fn with_should_fail(mut self, should_fail: bool) -> Self {
        self.should_fail = should_fail;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn worker_ref(&self) -> WorkerRef<'static> {
        if self.wrapped {
            WorkerRef::Adapter("JobWrapper")
        } else {
            WorkerRef::Name(self.worker)
        }
    }

    pub async fn execute(&self) -> std::result::Result<(), String> {
        tokio::time::sleep(self.duration).await;
        if self.should_fail {
            Err(format!("{} failed", self.worker))
        } else {
            Ok(())
        }
    }
}

/// Minimal job backend with client and server middleware hooks.
pub struct TestBackend {
    pub client: SubmissionInterceptor,
    pub server: ExecutionInterceptor,
    pub jobs: Mutex<VecDeque<TestJob>>,
    pub dead: Mutex<Vec<TestJob>>,
}

impl TestBackend {
    pub fn new(client: SubmissionInterceptor, server: ExecutionInterceptor) -> Self {
        Self {
            client,
            server,
            jobs: Mutex::new(VecDeque::new()),
            dead: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, job: TestJob) -> std::result::Result<(), String> {
        let invocation = JobInvocation::new(job.worker_ref(), &job.payload, &job.queue);
        let jobs = &self.jobs;
        let queued = job.clone();
        self.client
            .call(invocation, move || async move {
                jobs.lock().await.push_back(queued);
                Ok(())
            })
            .await
    }

    /// Runs one job; failures go to the dead set, so errors must reach the backend.
    pub async fn process_one(&self) -> bool {
        let Some(job) = self.jobs.lock().await.pop_front() else {
            return false;
        };

        let invocation = JobInvocation::new(job.worker_ref(), &job.payload, &job.queue);
        let job_ref = &job;
        let result = self.server.call(invocation, move || job_ref.execute()).await;
        if let Err(e) = result {
            tracing::info!(worker = job.worker, queue = %job.queue, "dead-lettering job: {e}");
            self.dead.lock().await.push(job.clone());
        }
        true
    }

    pub async fn drain(&self) {
        while self.process_one().await {}
    }
}
