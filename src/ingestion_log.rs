//! Structured event logging for the ingestion pipeline.
//!
//! Components receive an `Arc<dyn IngestionLogger>` instead of calling
//! `tracing` directly so tests can assert on what happened.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionEventType {
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    ModeDowngraded,
    RecordingQueued,
    RecordingCreated,
    RecordingSkipped,
    RecordingFailed,
    GenerationAttempt,
    ModelSkipped,
    BackoffWait,
    PlaceholderGenerated,
    ContentRedacted,
}

impl IngestionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionEventType::TaskStarted => "task_started",
            IngestionEventType::TaskCompleted => "task_completed",
            IngestionEventType::TaskFailed => "task_failed",
            IngestionEventType::ModeDowngraded => "mode_downgraded",
            IngestionEventType::RecordingQueued => "recording_queued",
            IngestionEventType::RecordingCreated => "recording_created",
            IngestionEventType::RecordingSkipped => "recording_skipped",
            IngestionEventType::RecordingFailed => "recording_failed",
            IngestionEventType::GenerationAttempt => "generation_attempt",
            IngestionEventType::ModelSkipped => "model_skipped",
            IngestionEventType::BackoffWait => "backoff_wait",
            IngestionEventType::PlaceholderGenerated => "placeholder_generated",
            IngestionEventType::ContentRedacted => "content_redacted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionEvent {
    pub event_type: IngestionEventType,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
    /// Unix timestamp (milliseconds).
    pub timestamp: i64,
}

impl IngestionEvent {
    pub fn new(event_type: IngestionEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            details: serde_json::Value::Null,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

pub trait IngestionLogger: Send + Sync {
    fn log(&self, event: IngestionEvent);
}

/// Forwards events to `tracing`.
pub struct TracingLogger;

impl IngestionLogger for TracingLogger {
    fn log(&self, event: IngestionEvent) {
        let kind = event.event_type.as_str();
        match event.event_type {
            IngestionEventType::TaskFailed
            | IngestionEventType::RecordingFailed
            | IngestionEventType::ModeDowngraded => {
                warn!(event = kind, details = %event.details, "{}", event.message)
            }
            IngestionEventType::GenerationAttempt | IngestionEventType::BackoffWait => {
                debug!(event = kind, details = %event.details, "{}", event.message)
            }
            _ => info!(event = kind, details = %event.details, "{}", event.message),
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct MemoryLogger {
    events: Mutex<Vec<IngestionEvent>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: IngestionEventType) -> Vec<IngestionEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl IngestionLogger for MemoryLogger {
    fn log(&self, event: IngestionEvent) {
        self.events.lock().unwrap().push(event);
    }
}
