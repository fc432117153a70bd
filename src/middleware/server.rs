use std::time::Instant;

use crate::{
    labels::{JobInvocation, LabelSet},
    metrics::JobMetrics,
    middleware::ServerMiddleware,
};

/// Counts executions, successes and failures and times every job.
#[derive(Clone, Debug)]
pub struct ExecutionInterceptor {
    metrics: JobMetrics,
}

impl ExecutionInterceptor {
    pub fn new(metrics: JobMetrics) -> Self {
        Self { metrics }
    }

    /// Same as [`ServerMiddleware::call`] for job bodies that run synchronously.
    pub fn call_blocking<T, E>(
        &self,
        invocation: JobInvocation<'_>,
        next: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let timer = self.start(invocation);
        let result = next();
        timer.finish(result.is_ok());
        result
    }

    fn start<'a>(&'a self, invocation: JobInvocation<'a>) -> RuntimeTimer<'a> {
        let labels = invocation.labels();
        self.metrics.record_job_executed(&labels);
        RuntimeTimer::start(&self.metrics, labels)
    }
}

impl ServerMiddleware for ExecutionInterceptor {
    fn call<'a, F, Fut, T, E>(
        &'a self,
        invocation: JobInvocation<'a>,
        next: F,
    ) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Send + 'a,
    {
        async move {
            let timer = self.start(invocation);
            let result = next().await;
            timer.finish(result.is_ok());
            result
        }
    }
}

/// Records the outcome and runtime of one job when dropped.
///
/// A timer dropped without [`RuntimeTimer::finish`] (the job panicked or its
/// future was cancelled) counts as a failure, so `executed == success + failed`
/// holds once no job is in flight.
#[must_use = "dropping the timer immediately records a failed job"]
pub struct RuntimeTimer<'a> {
    metrics: &'a JobMetrics,
    labels: LabelSet<'a>,
    started: Instant,
    succeeded: bool,
}

impl<'a> RuntimeTimer<'a> {
    pub fn start(metrics: &'a JobMetrics, labels: LabelSet<'a>) -> Self {
        Self {
            metrics,
            labels,
            started: Instant::now(),
            succeeded: false,
        }
    }

    pub fn finish(mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

impl Drop for RuntimeTimer<'_> {
    fn drop(&mut self) {
        if self.succeeded {
            self.metrics.record_job_succeeded(&self.labels);
        } else {
            self.metrics.record_job_failed(&self.labels);
        }
        self.metrics
            .record_job_runtime(&self.labels, self.started.elapsed().as_secs_f64());
    }
}
