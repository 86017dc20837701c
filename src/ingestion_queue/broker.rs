//! Durable task broker.

use super::models::IngestionTask;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker command failed: {0}")]
    Command(String),

    #[error("Task payload could not be (de)serialized: {0}")]
    Serialization(String),

    #[error("Broker did not answer in time")]
    Timeout,
}

impl From<redis::RedisError> for BrokerError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
            BrokerError::Connection(e.to_string())
        } else if e.is_timeout() {
            BrokerError::Timeout
        } else {
            BrokerError::Command(e.to_string())
        }
    }
}

#[async_trait]
pub trait TaskBroker: Send + Sync {
    fn name(&self) -> &str;

    async fn enqueue(&self, task: &IngestionTask) -> Result<(), BrokerError>;

    /// Wait up to `timeout` for the next task.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<IngestionTask>, BrokerError>;
}

/// Redis list broker: `LPUSH` to enqueue, `BRPOP` to dequeue.
///
/// Blocking pops use their own connection so they never hold up enqueues.
pub struct RedisBroker {
    enqueue_conn: ConnectionManager,
    dequeue_conn: ConnectionManager,
    queue_key: String,
}

impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker")
            .field("queue_key", &self.queue_key)
            .finish()
    }
}

impl RedisBroker {
    /// Connect and verify the server answers `PING` within `connect_timeout`.
    pub async fn connect(
        redis_url: &str,
        queue_key: &str,
        connect_timeout: Duration,
    ) -> Result<Self, BrokerError> {
        info!("Connecting to Redis broker");
        let client =
            redis::Client::open(redis_url).map_err(|e| BrokerError::Connection(e.to_string()))?;

        let connect = async {
            let mut enqueue_conn = ConnectionManager::new(client.clone()).await?;
            let dequeue_conn = ConnectionManager::new(client).await?;
            let pong: String = redis::cmd("PING").query_async(&mut enqueue_conn).await?;
            debug!("Redis broker answered {}", pong);
            Ok::<_, redis::RedisError>((enqueue_conn, dequeue_conn))
        };

        let (enqueue_conn, dequeue_conn) = tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| BrokerError::Timeout)??;

        info!("Redis broker ready on key {}", queue_key);
        Ok(Self {
            enqueue_conn,
            dequeue_conn,
            queue_key: queue_key.to_string(),
        })
    }
}

#[async_trait]
impl TaskBroker for RedisBroker {
    fn name(&self) -> &str {
        "redis"
    }

    async fn enqueue(&self, task: &IngestionTask) -> Result<(), BrokerError> {
        let payload =
            serde_json::to_string(task).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        let mut conn = self.enqueue_conn.clone();
        let _: i64 = conn.lpush(&self.queue_key, payload).await?;
        debug!("Enqueued task {} ({})", task.task_id, task.kind.as_str());
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<IngestionTask>, BrokerError> {
        let mut conn = self.dequeue_conn.clone();
        let popped: Option<(String, String)> =
            conn.brpop(&self.queue_key, timeout.as_secs_f64()).await?;

        match popped {
            Some((_, payload)) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| BrokerError::Serialization(format!("{}: {}", e, payload))),
            None => Ok(None),
        }
    }
}
