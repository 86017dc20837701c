//! Ingestion task and report models.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a task asks the worker to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskKind {
    IngestArtist {
        artist_name: String,
    },
    IngestSingleRecording {
        catalog_id: String,
        #[serde(default)]
        force: bool,
    },
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::IngestArtist { .. } => "ingest-artist",
            TaskKind::IngestSingleRecording { .. } => "ingest-single-recording",
        }
    }

    /// Batch tasks bound each step instead of the whole run.
    pub fn is_batch(&self) -> bool {
        matches!(self, TaskKind::IngestArtist { .. })
    }

    pub fn artist(artist_name: impl Into<String>) -> Self {
        TaskKind::IngestArtist {
            artist_name: artist_name.into(),
        }
    }

    pub fn recording(catalog_id: impl Into<String>, force: bool) -> Self {
        TaskKind::IngestSingleRecording {
            catalog_id: catalog_id.into(),
            force,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Artist name cannot be empty")]
    EmptyArtistName,

    #[error("Catalog id cannot be empty")]
    EmptyCatalogId,

    #[error("Submitter cannot be empty")]
    EmptySubmitter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionTask {
    pub task_id: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    /// User the request originates from.
    pub submitted_by: String,
    /// Unix timestamp (seconds).
    pub submitted_at: i64,
}

impl IngestionTask {
    pub fn new(kind: TaskKind, submitted_by: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            kind,
            submitted_by: submitted_by.into(),
            submitted_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Structural payload check, the only reason a submit can fail.
    pub fn validate(&self) -> Result<(), SubmitError> {
        if self.submitted_by.trim().is_empty() {
            return Err(SubmitError::EmptySubmitter);
        }
        match &self.kind {
            TaskKind::IngestArtist { artist_name } if artist_name.trim().is_empty() => {
                Err(SubmitError::EmptyArtistName)
            }
            TaskKind::IngestSingleRecording { catalog_id, .. } if catalog_id.trim().is_empty() => {
                Err(SubmitError::EmptyCatalogId)
            }
            _ => Ok(()),
        }
    }
}

/// Result for one recording of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordingOutcome {
    Created {
        work_id: String,
        arrangement_id: String,
        version: u32,
    },
    /// Handed to the broker as its own single-recording task.
    Queued { task_id: String },
    SkippedAlreadyExists { work_id: String },
    SkippedDenylisted { term: String },
    Failed { reason: String },
}

impl RecordingOutcome {
    /// Short form used in logs: `created`, `queued`, `skipped: already_exists`,
    /// `skipped: denylisted`, `failed: <reason>`.
    pub fn label(&self) -> String {
        match self {
            RecordingOutcome::Created { .. } => "created".to_string(),
            RecordingOutcome::Queued { .. } => "queued".to_string(),
            RecordingOutcome::SkippedAlreadyExists { .. } => "skipped: already_exists".to_string(),
            RecordingOutcome::SkippedDenylisted { .. } => "skipped: denylisted".to_string(),
            RecordingOutcome::Failed { reason } => format!("failed: {}", reason),
        }
    }

    /// The outcome without its reason, e.g. `skipped_denylisted`.
    pub fn kind_str(&self) -> &'static str {
        match self {
            RecordingOutcome::Created { .. } => "created",
            RecordingOutcome::Queued { .. } => "queued",
            RecordingOutcome::SkippedAlreadyExists { .. } => "skipped_already_exists",
            RecordingOutcome::SkippedDenylisted { .. } => "skipped_denylisted",
            RecordingOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, RecordingOutcome::Created { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecordingOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingReport {
    pub catalog_id: String,
    pub title: Option<String>,
    pub outcome: RecordingOutcome,
}

/// What executing a task produced, before the queue wraps it in a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskExecution {
    pub recordings: Vec<RecordingReport>,
    /// Task-level failure; per-recording failures live in `recordings`.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub recordings: Vec<RecordingReport>,
    pub failure: Option<String>,
}

impl TaskReport {
    pub fn from_execution(task: &IngestionTask, execution: TaskExecution) -> Self {
        let status = if execution.failure.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };
        Self {
            task_id: task.task_id.clone(),
            kind: task.kind.clone(),
            status,
            recordings: execution.recordings,
            failure: execution.failure,
        }
    }

    pub fn failed(task: &IngestionTask, reason: impl Into<String>) -> Self {
        Self {
            task_id: task.task_id.clone(),
            kind: task.kind.clone(),
            status: TaskStatus::Failed,
            recordings: Vec::new(),
            failure: Some(reason.into()),
        }
    }

    pub fn outcome_labels(&self) -> Vec<String> {
        self.recordings.iter().map(|r| r.outcome.label()).collect()
    }
}
