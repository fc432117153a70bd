use std::sync::Arc;

use crate::{
    collector::SnapshotCollector,
    config::{MetricsConfig, Role},
    error::{MetricsError, Result},
    metrics::{JobMetrics, Metrics},
    middleware::{ExecutionInterceptor, SubmissionInterceptor},
    stats::StatsSource,
};

/// Start-up wiring: registers the job metrics once and hands out the
/// interceptors and collector that write into them.
///
/// ```no_run
/// use std::sync::Arc;
/// use queue_metrics::{
///     config::MetricsConfig, instrumentation::Instrumentation, metrics::NoopMetrics,
///     stats::RedisStats,
/// };
///
/// # fn main() -> queue_metrics::error::Result<()> {
/// let instrumentation = Instrumentation::new(Arc::new(NoopMetrics), MetricsConfig::default())?;
/// let client = instrumentation.client_middleware();
/// let server = instrumentation.server_middleware()?;
/// instrumentation.install_collector(RedisStats::new("redis://127.0.0.1:6379")?)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Instrumentation {
    metrics: JobMetrics,
    config: MetricsConfig,
}

impl Instrumentation {
    pub fn new(registry: Arc<dyn Metrics>, config: MetricsConfig) -> Result<Self> {
        let metrics = JobMetrics::register(registry, &config)?;
        log::info!(
            "Registered job metrics for {:?} role{}",
            config.role,
            config
                .group
                .as_deref()
                .map(|group| format!(" in group '{group}'"))
                .unwrap_or_default()
        );
        Ok(Self { metrics, config })
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn client_middleware(&self) -> SubmissionInterceptor {
        SubmissionInterceptor::new(self.metrics.clone())
    }

    pub fn server_middleware(&self) -> Result<ExecutionInterceptor> {
        self.require_server("execution interceptor")?;
        Ok(ExecutionInterceptor::new(self.metrics.clone()))
    }

    pub fn collector<S: StatsSource>(&self, source: S) -> Result<SnapshotCollector<S>> {
        self.require_server("snapshot collector")?;
        Ok(SnapshotCollector::new(source, self.metrics.clone())
            .with_retries_by_queue(self.config.collect_retries_by_queue))
    }

    /// Builds a collector and hooks it into the registry's collection cycle.
    pub fn install_collector<S: StatsSource + 'static>(
        &self,
        source: S,
    ) -> Result<Arc<SnapshotCollector<S>>> {
        let collector = Arc::new(self.collector(source)?);
        self.metrics.registry().on_collect(collector.clone());
        Ok(collector)
    }

    fn require_server(&self, component: &str) -> Result<()> {
        match self.config.role {
            Role::Server => Ok(()),
            Role::Client => Err(MetricsError::RegistrationError(format!(
                "{component} needs server metrics, but they are not registered in client role"
            ))),
        }
    }
}
