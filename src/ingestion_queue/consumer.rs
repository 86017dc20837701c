//! Durable-mode consumer loop.

use super::broker::BrokerError;
use super::queue::{IngestionQueue, InlineTurn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pulls tasks from the broker and runs up to `consumer_concurrency` of them
/// at once.
///
/// A broker failure switches the queue to fallback mode and stops the loop;
/// tasks left in the broker wait for the next process start.
pub struct QueueConsumer {
    queue: IngestionQueue,
    permits: Arc<Semaphore>,
    concurrency: usize,
    poll_interval: Duration,
}

impl QueueConsumer {
    pub fn new(queue: IngestionQueue) -> Self {
        let concurrency = queue.settings().consumer_concurrency.max(1);
        let poll_interval = queue.settings().poll_interval.max(MIN_POLL_INTERVAL);
        Self {
            queue,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            poll_interval,
        }
    }

    /// Main processing loop - call from a spawned task.
    pub async fn run(&self, shutdown: CancellationToken) {
        let Some(broker) = self.queue.broker() else {
            info!("Queue consumer has no broker, nothing to consume");
            return;
        };
        info!(
            "Queue consumer starting on {} (concurrency={}, poll={:?})",
            broker.name(),
            self.concurrency,
            self.poll_interval
        );

        loop {
            if self.queue.mode() == super::QueueMode::Fallback {
                warn!("Queue is in fallback mode, consumer stopping");
                break;
            }

            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.cancelled() => {
                    info!("Queue consumer shutting down");
                    break;
                }
            };

            let next = tokio::select! {
                next = broker.dequeue(self.poll_interval) => next,
                _ = shutdown.cancelled() => {
                    info!("Queue consumer shutting down");
                    break;
                }
            };

            match next {
                Ok(Some(task)) => {
                    debug!("Dequeued task {} ({})", task.task_id, task.kind.as_str());
                    let queue = self.queue.clone();
                    tokio::spawn(async move {
                        queue.run_task(task, InlineTurn::default()).await;
                        drop(permit);
                    });
                }
                Ok(None) | Err(BrokerError::Timeout) => {}
                Err(BrokerError::Serialization(e)) => {
                    warn!("Dropping undecodable task payload: {}", e);
                }
                Err(e) => {
                    self.queue.enter_fallback(&e.to_string());
                    break;
                }
            }
        }

        // Let in-flight tasks finish.
        let _drain = self.permits.acquire_many(self.concurrency as u32).await;
        info!("Queue consumer stopped");
    }
}
