//! Dual-mode ingestion task dispatch.

mod broker;
mod consumer;
mod mode;
mod models;
mod queue;

pub use broker::{BrokerError, RedisBroker, TaskBroker};
pub use consumer::QueueConsumer;
pub use mode::{DispatchMode, QueueMode};
pub use models::{
    IngestionTask, RecordingOutcome, RecordingReport, SubmitError, TaskExecution, TaskKind,
    TaskReport, TaskStatus,
};
pub use queue::{ChildDispatch, IngestionQueue, InlineTurn, TaskExecutor};
