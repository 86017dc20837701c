//! Per-task ingestion logic.

use super::denylist::Denylist;
use super::error::IngestionError;
use super::state::RecordingState;
use crate::config::WorkerSettings;
use crate::fidelity::FidelityFilter;
use crate::generation::{ArrangementGenerator, ArrangementRequest, Sleeper};
use crate::ingestion_log::{IngestionEvent, IngestionEventType, IngestionLogger};
use crate::ingestion_queue::{
    ChildDispatch, IngestionQueue, IngestionTask, InlineTurn, RecordingOutcome, RecordingReport,
    TaskExecution, TaskExecutor, TaskKind,
};
use crate::metadata::MetadataLookup;
use crate::work_store::{WorkIdentity, WorkStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct IngestionWorker {
    metadata: Arc<dyn MetadataLookup>,
    generator: ArrangementGenerator,
    filter: FidelityFilter,
    store: Arc<dyn WorkStore>,
    denylist: Denylist,
    throttle_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
    logger: Arc<dyn IngestionLogger>,
}

/// Tracks one recording through the pipeline states.
struct Progress<'a> {
    catalog_id: &'a str,
    title: Option<String>,
    state: RecordingState,
}

impl<'a> Progress<'a> {
    fn new(catalog_id: &'a str) -> Self {
        Self {
            catalog_id,
            title: None,
            state: RecordingState::Discovering,
        }
    }

    fn advance(&mut self, next: RecordingState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "Unexpected state change {:?} -> {:?} for recording {}",
                self.state, next, self.catalog_id
            );
        }
        debug!(
            "Recording {}: {:?} -> {:?}",
            self.catalog_id, self.state, next
        );
        self.state = next;
    }

    fn finish(mut self, terminal: RecordingState, outcome: RecordingOutcome) -> RecordingReport {
        debug_assert!(terminal.is_terminal(), "{:?} is not terminal", terminal);
        self.advance(terminal);
        RecordingReport {
            catalog_id: self.catalog_id.to_string(),
            title: self.title,
            outcome,
        }
    }
}

impl IngestionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metadata: Arc<dyn MetadataLookup>,
        generator: ArrangementGenerator,
        filter: FidelityFilter,
        store: Arc<dyn WorkStore>,
        settings: &WorkerSettings,
        sleeper: Arc<dyn Sleeper>,
        logger: Arc<dyn IngestionLogger>,
    ) -> Result<Self> {
        let denylist = Denylist::new(&settings.denylist).context("Invalid denylist term")?;
        Ok(Self {
            metadata,
            generator,
            filter,
            store,
            denylist,
            throttle_delay: settings.throttle_delay,
            sleeper,
            logger,
        })
    }

    /// Resolve every recording of `artist_name` and ingest each one, either
    /// as its own queued task or inline with a throttle between recordings.
    ///
    /// The lookup and each inline recording run under the queue's task
    /// deadline separately, so one stalled recording fails alone.
    pub async fn ingest_artist(
        &self,
        artist_name: &str,
        submitted_by: &str,
        queue: &IngestionQueue,
        turn: &mut InlineTurn,
    ) -> TaskExecution {
        let deadline = queue.settings().task_timeout;
        let lookup = tokio::time::timeout(deadline, self.metadata.search("", artist_name)).await;
        let recordings = match lookup {
            Ok(Ok(recordings)) => recordings,
            Ok(Err(e)) => {
                return TaskExecution {
                    recordings: Vec::new(),
                    failure: Some(IngestionError::Lookup(e).to_string()),
                };
            }
            Err(_) => {
                return TaskExecution {
                    recordings: Vec::new(),
                    failure: Some(IngestionError::DeadlineExceeded.to_string()),
                };
            }
        };
        debug!(
            "Artist {} resolved to {} recordings",
            artist_name,
            recordings.len()
        );

        let mut reports = Vec::with_capacity(recordings.len());
        let mut ran_inline = false;
        for meta in recordings {
            let child = IngestionTask::new(TaskKind::recording(&meta.catalog_id, false), submitted_by);
            match queue.dispatch_child(child, turn).await {
                ChildDispatch::Queued { task_id } => {
                    self.logger.log(
                        IngestionEvent::new(
                            IngestionEventType::RecordingQueued,
                            format!("Queued recording {} as task {}", meta.catalog_id, task_id),
                        )
                        .with_details(serde_json::json!({
                            "catalog_id": meta.catalog_id,
                            "task_id": task_id,
                        })),
                    );
                    reports.push(RecordingReport {
                        catalog_id: meta.catalog_id,
                        title: Some(meta.title),
                        outcome: RecordingOutcome::Queued { task_id },
                    });
                }
                ChildDispatch::Inline => {
                    if ran_inline {
                        self.sleeper.sleep(self.throttle_delay).await;
                    }
                    ran_inline = true;
                    let ingest = self.ingest_recording(&meta.catalog_id, false);
                    let report = match tokio::time::timeout(deadline, ingest).await {
                        Ok(report) => report,
                        Err(_) => {
                            let mut progress = Progress::new(&meta.catalog_id);
                            progress.title = Some(meta.title.clone());
                            self.fail(progress, IngestionError::DeadlineExceeded)
                        }
                    };
                    reports.push(report);
                }
            }
        }

        TaskExecution {
            recordings: reports,
            failure: None,
        }
    }

    /// Ingest one recording. Never panics or aborts on failure; the outcome
    /// carries the reason instead.
    pub async fn ingest_recording(&self, catalog_id: &str, force: bool) -> RecordingReport {
        let mut progress = Progress::new(catalog_id);

        let meta = match self.metadata.get_by_id(catalog_id).await {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                return self.fail(
                    progress,
                    IngestionError::NotFoundUpstream(catalog_id.to_string()),
                )
            }
            Err(e) => return self.fail(progress, e.into()),
        };
        progress.title = Some(meta.title.clone());

        if let Some(term) = self.denylist.matches(&meta.title) {
            return self.skip(
                progress,
                RecordingOutcome::SkippedDenylisted {
                    term: term.to_string(),
                },
            );
        }

        progress.advance(RecordingState::GuardChecking);
        let identity = WorkIdentity::catalog(&meta.title, &meta.artist, &meta.catalog_id);
        let work = match self.store.find_or_create_work(&identity) {
            Ok(work) => work,
            Err(e) => return self.fail(progress, IngestionError::Persistence(e)),
        };
        if !force {
            match self.store.count_arrangements(&work.id) {
                Ok(0) => {}
                Ok(_) => {
                    return self.skip(
                        progress,
                        RecordingOutcome::SkippedAlreadyExists { work_id: work.id },
                    )
                }
                Err(e) => return self.fail(progress, IngestionError::Persistence(e)),
            }
        }

        progress.advance(RecordingState::Generating);
        let request = ArrangementRequest::new(&meta.title, &meta.artist);
        let mut generation = match self.generator.generate(&request).await {
            Ok(report) => report,
            Err(e) => return self.fail(progress, e.into()),
        };

        progress.advance(RecordingState::Filtering);
        let filtered = self.filter.apply(&generation.output, &meta.title);
        if let Some(last) = generation.attempts.last_mut() {
            last.hallucination = Some(filtered.verdict.hallucination.is_some());
        }
        if filtered.verdict.redacted {
            self.logger.log(
                IngestionEvent::new(
                    IngestionEventType::ContentRedacted,
                    format!(
                        "Redacted arrangement for {} (confidence {:.2})",
                        catalog_id, filtered.verdict.confidence
                    ),
                )
                .with_details(serde_json::json!({
                    "catalog_id": catalog_id,
                    "confidence": filtered.verdict.confidence,
                    "hallucination": filtered.verdict.hallucination,
                })),
            );
        }

        progress.advance(RecordingState::Persisting);
        let arrangement = match self.store.create_arrangement(&work.id, &filtered.content) {
            Ok(arrangement) => arrangement,
            Err(e) => return self.fail(progress, IngestionError::Persistence(e)),
        };

        self.logger.log(
            IngestionEvent::new(
                IngestionEventType::RecordingCreated,
                format!(
                    "Created arrangement v{} for {} - {}",
                    arrangement.version, meta.artist, meta.title
                ),
            )
            .with_details(serde_json::json!({
                "catalog_id": catalog_id,
                "work_id": work.id,
                "arrangement_id": arrangement.id,
                "version": arrangement.version,
                "notes": arrangement.notes,
                "lines": generation.output.arrangement.line_count(),
                "attempts": generation.attempts,
            })),
        );
        progress.finish(
            RecordingState::Done,
            RecordingOutcome::Created {
                work_id: work.id,
                arrangement_id: arrangement.id,
                version: arrangement.version,
            },
        )
    }

    fn skip(&self, progress: Progress<'_>, outcome: RecordingOutcome) -> RecordingReport {
        self.logger.log(
            IngestionEvent::new(
                IngestionEventType::RecordingSkipped,
                format!("Skipped recording {}: {}", progress.catalog_id, outcome.label()),
            )
            .with_details(serde_json::json!({
                "catalog_id": progress.catalog_id,
                "title": progress.title,
            })),
        );
        progress.finish(RecordingState::Skipped, outcome)
    }

    fn fail(&self, progress: Progress<'_>, error: IngestionError) -> RecordingReport {
        let reason = error.to_string();
        self.logger.log(
            IngestionEvent::new(
                IngestionEventType::RecordingFailed,
                format!("Recording {} failed: {}", progress.catalog_id, reason),
            )
            .with_details(serde_json::json!({
                "catalog_id": progress.catalog_id,
                "title": progress.title,
                "state": format!("{:?}", progress.state),
            })),
        );
        progress.finish(RecordingState::Failed, RecordingOutcome::Failed { reason })
    }
}

#[async_trait]
impl TaskExecutor for IngestionWorker {
    async fn execute(
        &self,
        task: &IngestionTask,
        queue: &IngestionQueue,
        turn: &mut InlineTurn,
    ) -> TaskExecution {
        match &task.kind {
            TaskKind::IngestArtist { artist_name } => {
                self.ingest_artist(artist_name, &task.submitted_by, queue, turn)
                    .await
            }
            TaskKind::IngestSingleRecording { catalog_id, force } => {
                let report = self.ingest_recording(catalog_id, *force).await;
                let failure = match &report.outcome {
                    RecordingOutcome::Failed { reason } => Some(reason.clone()),
                    _ => None,
                };
                TaskExecution {
                    recordings: vec![report],
                    failure,
                }
            }
        }
    }
}
