use crate::{labels::JobInvocation, metrics::JobMetrics, middleware::ClientMiddleware};

/// Counts every job submission by `{queue, worker}`.
#[derive(Clone, Debug)]
pub struct SubmissionInterceptor {
    metrics: JobMetrics,
}

impl SubmissionInterceptor {
    pub fn new(metrics: JobMetrics) -> Self {
        Self { metrics }
    }

    /// Same as [`ClientMiddleware::call`] for backends that enqueue synchronously.
    pub fn call_blocking<T, E>(
        &self,
        invocation: JobInvocation<'_>,
        next: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        self.metrics.record_job_enqueued(&invocation.labels());
        next()
    }
}

impl ClientMiddleware for SubmissionInterceptor {
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
            self.metrics.record_job_enqueued(&invocation.labels());
            next().await
        }
    }
}
