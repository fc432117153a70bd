use serde_json::Value;

/// Longest `wrapped` class name accepted from a job payload.
pub const MAX_WRAPPED_CLASS_LEN: usize = 256;

/// How the job backend refers to the worker that handles a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerRef<'a> {
    /// Worker given by name, e.g. when enqueueing by class name.
    Name(&'a str),
    /// Worker given by its Rust type.
    Type(&'static str),
    /// A generic adapter that delegates to the class named in the payload's
    /// `wrapped` field. Holds the adapter's own type name.
    Adapter(&'a str),
}

impl WorkerRef<'static> {
    pub fn of<T: ?Sized>() -> Self {
        Self::Type(std::any::type_name::<T>())
    }

    pub fn adapter_of<T: ?Sized>() -> Self {
        Self::Adapter(std::any::type_name::<T>())
    }
}

impl<'a> WorkerRef<'a> {
    /// The reference's own name, without looking through adapters.
    pub fn raw_name(&self) -> &'a str {
        match *self {
            Self::Name(name) => name,
            Self::Type(name) => name,
            Self::Adapter(name) => name,
        }
    }
}

/// One job as seen by an interceptor.
#[derive(Clone, Copy, Debug)]
pub struct JobInvocation<'a> {
    pub worker: WorkerRef<'a>,
    pub payload: &'a Value,
    pub queue: &'a str,
}

impl<'a> JobInvocation<'a> {
    pub fn new(worker: WorkerRef<'a>, payload: &'a Value, queue: &'a str) -> Self {
        Self {
            worker,
            payload,
            queue,
        }
    }

    pub fn labels(&self) -> LabelSet<'a> {
        resolve(self.worker, self.payload, self.queue)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LabelSet<'a> {
    pub queue: &'a str,
    pub worker: &'a str,
}

impl<'a> LabelSet<'a> {
    pub fn as_pairs(&self) -> [(&'static str, &'a str); 2] {
        [("queue", self.queue), ("worker", self.worker)]
    }
}

/// Maps a job to its `{queue, worker}` labels.
///
/// Adapter-wrapped jobs are labelled with the inner class so that the same job
/// type gets the same series whichever way it was enqueued. A missing, empty or
/// oversized `wrapped` value falls back to the adapter's own name. Any other
/// string is taken as is; the registry escapes label values.
pub fn resolve<'a>(worker: WorkerRef<'a>, payload: &'a Value, queue: &'a str) -> LabelSet<'a> {
    let worker = match worker {
        WorkerRef::Adapter(_) => payload
            .get("wrapped")
            .and_then(Value::as_str)
            .filter(|class| is_class_name(class))
            .unwrap_or_else(|| worker.raw_name()),
        _ => worker.raw_name(),
    };

    LabelSet { queue, worker }
}

fn is_class_name(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.len() <= MAX_WRAPPED_CLASS_LEN
}
