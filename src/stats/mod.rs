pub mod redis_stats;

pub use redis_stats::RedisStats;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::{MetricsError, Result};

/// Aggregate backend state at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendSnapshot {
    /// Pending jobs per queue.
    pub queues: BTreeMap<String, u64>,
    pub workers_size: u64,
    pub scheduled_size: u64,
    pub retry_size: u64,
    pub dead_size: u64,
    pub processes_size: u64,
}

impl BackendSnapshot {
    pub fn total_waiting(&self) -> u64 {
        self.queues.values().sum()
    }
}

/// Read-only view of the job backend's state. Any call may fail transiently.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn snapshot(&self) -> Result<BackendSnapshot>;

    /// Seconds since the oldest pending job in `queue` was enqueued; 0 when empty.
    async fn queue_latency(&self, queue: &str) -> Result<f64>;

    /// Retry-set size per queue. Backends without a cheap way to compute it
    /// can leave the default.
    async fn retries_by_queue(&self) -> Result<BTreeMap<String, u64>> {
        Err(MetricsError::Unsupported(
            "retry counts by queue".to_string(),
        ))
    }
}
