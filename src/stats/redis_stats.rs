use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{MetricsError, Result},
    stats::{BackendSnapshot, StatsSource},
};

/// Reads backend state from Redis using the Sidekiq key layout.
///
/// * `queues`: set of queue names, each backed by a `queue:<name>` list that
///   jobs are LPUSH'd onto, so the oldest job sits at the tail.
/// * `schedule`, `retry`, `dead`: sorted sets of job entries.
/// * `processes`: set of process identities; each names a hash with a `busy` field.
///
/// One multiplexed connection is opened lazily and shared by every call until
/// a Redis error drops it.
#[derive(Clone)]
pub struct RedisStats {
    client: Client,
    namespace: Option<String>,
    connect_timeout: Duration,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisStats {
    pub fn new(redis_url: &str) -> Result<Self> {
        if redis_url.is_empty() {
            return Err(MetricsError::ConnectionError(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        let client =
            Client::open(redis_url).map_err(|e| MetricsError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            namespace: None,
            connect_timeout: Duration::from_secs(5),
            connection: Arc::new(Mutex::new(None)),
        })
    }

    /// Prefix every key with `<namespace>:`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn key(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}:{key}"),
            None => key.to_string(),
        }
    }

    fn queue_key(&self, queue: &str) -> String {
        self.key(&format!("queue:{queue}"))
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let cached = self.connection.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let conn = match tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(conn_result) => conn_result.map_err(|e| MetricsError::ConnectionError(e.to_string()))?,
            Err(_) => return Err(MetricsError::TimeoutError),
        };
        *self.connection.lock() = Some(conn.clone());
        Ok(conn)
    }

    /// Forgets the shared connection after a Redis error so the next call reconnects.
    fn reset_on_error<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(MetricsError::RedisError(e)) = &result {
            log::debug!("Dropping Redis connection after error: {e}");
            self.connection.lock().take();
        }
        result
    }

    async fn read_snapshot(&self) -> Result<BackendSnapshot> {
        let mut conn = self.get_connection().await?;

        let mut queue_names: Vec<String> = conn.smembers(self.key("queues")).await?;
        queue_names.sort();
        let queues = if queue_names.is_empty() {
            BTreeMap::new()
        } else {
            let mut pipe = redis::pipe();
            for queue in &queue_names {
                pipe.cmd("LLEN").arg(self.queue_key(queue));
            }
            let sizes: Vec<u64> = pipe.query_async(&mut conn).await?;
            queue_names.into_iter().zip(sizes).collect()
        };

        let processes: Vec<String> = conn.smembers(self.key("processes")).await?;
        let workers_size = if processes.is_empty() {
            0
        } else {
            let mut pipe = redis::pipe();
            for process in &processes {
                pipe.cmd("HGET").arg(self.key(process)).arg("busy");
            }
            let busy: Vec<Option<u64>> = pipe.query_async(&mut conn).await?;
            busy.into_iter().flatten().sum()
        };

        let mut pipe = redis::pipe();
        pipe.cmd("ZCARD")
            .arg(self.key("schedule"))
            .cmd("ZCARD")
            .arg(self.key("retry"))
            .cmd("ZCARD")
            .arg(self.key("dead"));
        let (scheduled_size, retry_size, dead_size): (u64, u64, u64) =
            pipe.query_async(&mut conn).await?;

        let snapshot = BackendSnapshot {
            queues,
            workers_size,
            scheduled_size,
            retry_size,
            dead_size,
            processes_size: processes.len() as u64,
        };
        log::debug!(
            "Backend snapshot: {} jobs waiting in {} queues, {} processes, {} busy workers",
            snapshot.total_waiting(),
            snapshot.queues.len(),
            snapshot.processes_size,
            snapshot.workers_size
        );

        Ok(snapshot)
    }

    async fn read_queue_latency(&self, queue: &str) -> Result<f64> {
        let mut conn = self.get_connection().await?;
        let oldest: Vec<String> = conn.lrange(self.queue_key(queue), -1, -1).await?;

        match oldest.first() {
            Some(entry) => latency_of(entry, now_seconds()),
            None => Ok(0.0),
        }
    }

    async fn read_retries_by_queue(&self) -> Result<BTreeMap<String, u64>> {
        let mut conn = self.get_connection().await?;
        let entries: Vec<String> = conn.zrange(self.key("retry"), 0, -1).await?;
        count_by_queue(&entries)
    }
}

#[async_trait]
impl StatsSource for RedisStats {
    async fn snapshot(&self) -> Result<BackendSnapshot> {
        let result = self.read_snapshot().await;
        self.reset_on_error(result)
    }

    async fn queue_latency(&self, queue: &str) -> Result<f64> {
        let result = self.read_queue_latency(queue).await;
        self.reset_on_error(result)
    }

    async fn retries_by_queue(&self) -> Result<BTreeMap<String, u64>> {
        let result = self.read_retries_by_queue().await;
        self.reset_on_error(result)
    }
}

fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// The fields of a serialized job entry that introspection looks at.
#[derive(Debug, Deserialize)]
struct JobEntry {
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    enqueued_at: Option<Value>,
}

/// Age in seconds of a serialized job relative to `now`.
///
/// `enqueued_at` is epoch seconds when stored as a float and epoch
/// milliseconds when stored as an integer. A job without it has no age.
fn latency_of(entry: &str, now: f64) -> Result<f64> {
    let job: JobEntry = serde_json::from_str(entry)?;

    let enqueued_at = match job.enqueued_at {
        None | Some(Value::Null) => return Ok(0.0),
        Some(Value::Number(n)) if n.is_f64() => n.as_f64(),
        Some(Value::Number(n)) => n.as_f64().map(|millis| millis / 1000.0),
        Some(other) => {
            return Err(MetricsError::MalformedData(format!(
                "enqueued_at is not a number: {other}"
            )));
        }
    }
    .ok_or_else(|| MetricsError::MalformedData("enqueued_at out of range".to_string()))?;

    Ok((now - enqueued_at).max(0.0))
}

fn count_by_queue(entries: &[String]) -> Result<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        let job: JobEntry = serde_json::from_str(entry)?;
        let queue = job.queue.ok_or_else(|| {
            MetricsError::MalformedData("retry entry without a queue".to_string())
        })?;
        *counts.entry(queue).or_insert(0) += 1;
    }
    Ok(counts)
}
