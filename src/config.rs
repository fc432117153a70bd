/// Runtime buckets in seconds: the standard Prometheus set extended up to six
/// hours, since background jobs can run for a very long time.
pub const LONG_RUNNING_JOB_RUNTIME_BUCKETS: [f64; 18] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    1800.0, 3600.0, 21600.0,
];

/// Which side of the job backend this process runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Only enqueues jobs. Just the enqueue counter is registered.
    Client,
    /// Processes jobs. Execution, runtime and snapshot metrics are registered too.
    Server,
}

impl Default for Role {
    fn default() -> Self {
        Self::Server
    }
}

#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Optional prefix joined to every metric name with `_`.
    pub group: Option<String>,
    pub role: Role,
    pub runtime_buckets: Vec<f64>,
    /// Scans the whole retry set on every collection. Slow on large retry sets.
    pub collect_retries_by_queue: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            group: None,
            role: Role::default(),
            runtime_buckets: LONG_RUNNING_JOB_RUNTIME_BUCKETS.to_vec(),
            collect_retries_by_queue: false,
        }
    }
}

impl MetricsConfig {
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_retries_by_queue(mut self, enabled: bool) -> Self {
        self.collect_retries_by_queue = enabled;
        self
    }

    pub fn metric_name(&self, name: &str) -> String {
        match &self.group {
            Some(group) if !group.is_empty() => format!("{group}_{name}"),
            _ => name.to_string(),
        }
    }
}
