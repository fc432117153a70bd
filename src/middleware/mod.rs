pub mod client;
pub mod server;

pub use client::SubmissionInterceptor;
pub use server::{ExecutionInterceptor, RuntimeTimer};

use crate::labels::JobInvocation;

/// Hook run around every job submission.
///
/// `next` performs the actual submission. Implementations must return its
/// outcome unchanged.
pub trait ClientMiddleware: Send + Sync {
    fn call<'a, F, Fut, T, E>(
        &'a self,
        invocation: JobInvocation<'a>,
        next: F,
    ) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Send + 'a;
}

/// Hook run around every job execution on the processing side.
///
/// `next` runs the job body. Implementations may observe the outcome but must
/// hand back the same `Ok` or `Err` so the backend's retry logic still sees it.
pub trait ServerMiddleware: Send + Sync {
    fn call<'a, F, Fut, T, E>(
        &'a self,
        invocation: JobInvocation<'a>,
        next: F,
    ) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Send + 'a;
}
