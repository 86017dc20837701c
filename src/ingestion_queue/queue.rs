//! Dual-mode ingestion queue.
//!
//! While a broker is reachable tasks are pushed to it and executed by a
//! `QueueConsumer`. The first broker failure switches the queue to fallback
//! mode for the rest of the process lifetime: `submit` then runs each task
//! inline, serialized in FIFO order behind a fair mutex. Consumer-run tasks
//! that fall back to inline work take the same turn first.

use super::broker::{BrokerError, RedisBroker, TaskBroker};
use super::mode::{DispatchMode, QueueMode};
use super::models::{IngestionTask, SubmitError, TaskExecution, TaskKind, TaskReport, TaskStatus};
use crate::config::QueueSettings;
use crate::ingestion_log::{IngestionEvent, IngestionEventType, IngestionLogger};
use crate::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{info, warn};

const REPORT_CHANNEL_CAPACITY: usize = 256;

/// Runs one task. The queue and the task's inline turn are passed back in
/// so an executor can dispatch follow-up tasks.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        task: &IngestionTask,
        queue: &IngestionQueue,
        turn: &mut InlineTurn,
    ) -> TaskExecution;
}

/// A task's claim on the fallback FIFO. Empty until the task first runs
/// work inline, then held until the task finishes.
#[derive(Default)]
pub struct InlineTurn {
    guard: Option<OwnedMutexGuard<()>>,
}

impl InlineTurn {
    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

/// How a follow-up task was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildDispatch {
    /// Pushed to the broker under this task id.
    Queued { task_id: String },
    /// No broker; the caller must run the work itself.
    Inline,
}

struct QueueInner {
    broker: Option<Arc<dyn TaskBroker>>,
    executor: Arc<dyn TaskExecutor>,
    mode: DispatchMode,
    /// Held across inline execution. Tokio's mutex is fair, so waiters run
    /// in the order they asked for a turn.
    fifo: Arc<Mutex<()>>,
    reports: broadcast::Sender<TaskReport>,
    settings: QueueSettings,
    logger: Arc<dyn IngestionLogger>,
}

#[derive(Clone)]
pub struct IngestionQueue {
    inner: Arc<QueueInner>,
}

impl IngestionQueue {
    /// Without a broker the queue starts in fallback mode.
    pub fn new(
        broker: Option<Arc<dyn TaskBroker>>,
        executor: Arc<dyn TaskExecutor>,
        settings: QueueSettings,
        logger: Arc<dyn IngestionLogger>,
    ) -> Self {
        let mode = if broker.is_some() {
            DispatchMode::durable()
        } else {
            DispatchMode::fallback()
        };
        Self::with_mode(broker, executor, settings, logger, mode)
    }

    pub fn with_mode(
        broker: Option<Arc<dyn TaskBroker>>,
        executor: Arc<dyn TaskExecutor>,
        settings: QueueSettings,
        logger: Arc<dyn IngestionLogger>,
        mode: DispatchMode,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        metrics::set_queue_mode(mode.current());
        Self {
            inner: Arc::new(QueueInner {
                broker,
                executor,
                mode,
                fifo: Arc::new(Mutex::new(())),
                reports,
                settings,
                logger,
            }),
        }
    }

    /// Connect to the configured broker. Any connection problem, or no
    /// broker URL at all, yields a queue already in fallback mode.
    pub async fn connect(
        settings: QueueSettings,
        executor: Arc<dyn TaskExecutor>,
        logger: Arc<dyn IngestionLogger>,
    ) -> Self {
        let broker: Option<Arc<dyn TaskBroker>> = match settings.broker_url.as_deref() {
            _ if cfg!(feature = "no_broker") => {
                info!("Built with no_broker, running tasks inline");
                None
            }
            None => {
                info!("No broker configured, running tasks inline");
                None
            }
            Some(url) => {
                match RedisBroker::connect(url, &settings.queue_key, settings.connect_timeout).await
                {
                    Ok(broker) => Some(Arc::new(broker)),
                    Err(e) => {
                        warn!("Broker unavailable ({}), running tasks inline", e);
                        None
                    }
                }
            }
        };
        Self::new(broker, executor, settings, logger)
    }

    pub fn mode(&self) -> QueueMode {
        self.inner.mode.current()
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.inner.settings
    }

    pub(crate) fn broker(&self) -> Option<Arc<dyn TaskBroker>> {
        self.inner.broker.clone()
    }

    /// Reports of every task executed by this process from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskReport> {
        self.inner.reports.subscribe()
    }

    pub async fn submit_ingestion(
        &self,
        kind: TaskKind,
        submitted_by: &str,
    ) -> Result<(), SubmitError> {
        self.submit(IngestionTask::new(kind, submitted_by)).await
    }

    /// Accept a task for execution.
    ///
    /// In durable mode this returns once the broker has the task. In
    /// fallback mode it returns once the task has run. Broker failures are
    /// never surfaced; they switch the queue to fallback mode.
    pub async fn submit(&self, task: IngestionTask) -> Result<(), SubmitError> {
        task.validate()?;

        if self.try_enqueue(&task).await {
            return Ok(());
        }

        let mut turn = InlineTurn::default();
        self.take_turn(&mut turn).await;
        self.run_task(task, turn).await;
        Ok(())
    }

    /// Dispatch a task produced while executing another one. When the broker
    /// is not taking tasks the parent's turn is taken, if it is not already
    /// held, and the caller must run the work inline instead of through
    /// `submit`.
    pub async fn dispatch_child(
        &self,
        task: IngestionTask,
        turn: &mut InlineTurn,
    ) -> ChildDispatch {
        if task.validate().is_ok() && self.try_enqueue(&task).await {
            return ChildDispatch::Queued {
                task_id: task.task_id,
            };
        }
        self.take_turn(turn).await;
        ChildDispatch::Inline
    }

    async fn take_turn(&self, turn: &mut InlineTurn) {
        if !turn.is_held() {
            turn.guard = Some(self.inner.fifo.clone().lock_owned().await);
        }
    }

    async fn try_enqueue(&self, task: &IngestionTask) -> bool {
        if self.inner.mode.is_fallback() {
            return false;
        }
        let Some(broker) = &self.inner.broker else {
            self.enter_fallback("no broker");
            return false;
        };

        let result = tokio::time::timeout(self.inner.settings.connect_timeout, broker.enqueue(task))
            .await
            .unwrap_or(Err(BrokerError::Timeout));
        match result {
            Ok(()) => true,
            Err(e) => {
                self.enter_fallback(&e.to_string());
                false
            }
        }
    }

    pub(crate) fn enter_fallback(&self, reason: &str) {
        if self.inner.mode.enter_fallback() {
            metrics::set_queue_mode(QueueMode::Fallback);
            self.inner.logger.log(
                IngestionEvent::new(
                    IngestionEventType::ModeDowngraded,
                    format!("Broker unavailable, switching to inline execution: {}", reason),
                )
                .with_details(serde_json::json!({ "reason": reason })),
            );
        }
    }

    /// Execute and publish the report. Single-recording tasks run under the
    /// task deadline; batch tasks bound each of their steps instead.
    pub(crate) async fn run_task(&self, task: IngestionTask, mut turn: InlineTurn) -> TaskReport {
        let inner = &self.inner;
        let started = Instant::now();
        metrics::set_task_running(true);
        inner.logger.log(
            IngestionEvent::new(
                IngestionEventType::TaskStarted,
                format!("Running {} task {}", task.kind.as_str(), task.task_id),
            )
            .with_details(serde_json::json!({
                "task_id": task.task_id,
                "task": task.kind,
                "submitted_by": task.submitted_by,
            })),
        );

        let execution = inner.executor.execute(&task, self, &mut turn);
        let report = if task.kind.is_batch() {
            TaskReport::from_execution(&task, execution.await)
        } else {
            match tokio::time::timeout(inner.settings.task_timeout, execution).await {
                Ok(execution) => TaskReport::from_execution(&task, execution),
                Err(_) => TaskReport::failed(&task, "deadline exceeded"),
            }
        };

        metrics::set_task_running(false);
        metrics::record_task_execution(task.kind.as_str(), report.status, started.elapsed());
        for recording in &report.recordings {
            metrics::record_recording_outcome(recording.outcome.kind_str());
        }

        let (event_type, verb) = match report.status {
            TaskStatus::Completed => (IngestionEventType::TaskCompleted, "completed"),
            TaskStatus::Failed => (IngestionEventType::TaskFailed, "failed"),
        };
        inner.logger.log(
            IngestionEvent::new(
                event_type,
                format!("Task {} {}", report.task_id, verb),
            )
            .with_details(serde_json::json!({
                "task_id": report.task_id,
                "outcomes": report.outcome_labels(),
                "failure": report.failure,
            })),
        );

        // No subscribers is fine.
        let _ = inner.reports.send(report.clone());
        report
    }
}
