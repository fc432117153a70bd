use async_trait::async_trait;

use crate::{
    error::Result,
    metrics::JobMetrics,
    process::current_resident_memory_bytes,
    stats::StatsSource,
};

/// Callback run by a metrics registry at the start of each collection cycle.
#[async_trait]
pub trait Collect: Send + Sync {
    async fn collect(&self) -> Result<()>;
}

/// Copies the job backend's aggregate state into gauges.
///
/// Has no timer of its own: the registry decides when and how often to call
/// [`Collect::collect`]. A failed cycle leaves the gauges written so far in
/// place and the rest at their previous values.
pub struct SnapshotCollector<S> {
    source: S,
    metrics: JobMetrics,
    retries_by_queue: bool,
    memory_probe: fn() -> Result<u64>,
}

impl<S: StatsSource> SnapshotCollector<S> {
    pub fn new(source: S, metrics: JobMetrics) -> Self {
        Self {
            source,
            metrics,
            retries_by_queue: false,
            memory_probe: current_resident_memory_bytes,
        }
    }

    pub fn with_retries_by_queue(mut self, enabled: bool) -> Self {
        self.retries_by_queue = enabled;
        self
    }

    pub fn with_memory_probe(mut self, probe: fn() -> Result<u64>) -> Self {
        self.memory_probe = probe;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn collect_backend(&self) -> Result<()> {
        let snapshot = self.source.snapshot().await?;

        for (queue, waiting) in &snapshot.queues {
            self.metrics.record_jobs_waiting(queue, *waiting);
        }
        self.metrics.record_active_workers(snapshot.workers_size);
        self.metrics.record_jobs_scheduled(snapshot.scheduled_size);
        self.metrics.record_jobs_dead(snapshot.dead_size);
        self.metrics.record_active_processes(snapshot.processes_size);
        self.metrics.record_jobs_retry(snapshot.retry_size);

        for queue in snapshot.queues.keys() {
            let latency = self.source.queue_latency(queue).await?;
            self.metrics.record_jobs_latency(queue, latency);
        }

        if self.retries_by_queue {
            for (queue, retries) in self.source.retries_by_queue().await? {
                self.metrics.record_retries_by_queue(&queue, retries);
            }
        }

        Ok(())
    }

    fn collect_memory(&self) {
        match (self.memory_probe)() {
            Ok(bytes) => self.metrics.record_memory_usage(bytes),
            Err(e) => log::debug!("Skipping memory usage gauge: {e}"),
        }
    }
}

#[async_trait]
impl<S: StatsSource> Collect for SnapshotCollector<S> {
    async fn collect(&self) -> Result<()> {
        self.collect_backend().await?;
        self.collect_memory();
        Ok(())
    }
}
