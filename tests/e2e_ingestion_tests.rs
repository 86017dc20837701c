//! End-to-end ingestion tests
//!
//! Drive the full pipeline (queue, worker, generator, filter and store)
//! against in-memory fakes.

mod common;

use common::{FakeCatalog, FakeProvider, Pipeline, MODELS, THROTTLE};
use repertoire_ingest::fidelity::REDACTION_MARKER;
use repertoire_ingest::generation::PENDING_MARKER;
use repertoire_ingest::ingestion_log::IngestionEventType;
use repertoire_ingest::metrics;
use repertoire_ingest::ingestion_queue::{
    QueueConsumer, QueueMode, RecordingOutcome, TaskKind, TaskReport, TaskStatus,
};
use repertoire_ingest::work_store::{ArrangementContent, WorkIdentity, WorkStore};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn kansas() -> FakeCatalog {
    FakeCatalog::new()
        .with_recording("rec-1", "Carry On Wayward Son", "Kansas")
        .with_recording("rec-2", "Dust in the Wind", "Kansas")
        .with_recording("rec-3", "Point of Know Return", "Kansas")
}

async fn submit(pipeline: &Pipeline, kind: TaskKind) -> TaskReport {
    let mut reports = pipeline.queue.subscribe();
    pipeline.queue.submit_ingestion(kind, "tester").await.unwrap();
    reports.try_recv().unwrap()
}

async fn next_reports(reports: &mut broadcast::Receiver<TaskReport>, n: usize) -> Vec<TaskReport> {
    let mut collected = Vec::with_capacity(n);
    while collected.len() < n {
        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .expect("timed out waiting for task reports")
            .unwrap();
        collected.push(report);
    }
    collected
}

fn created(report: &TaskReport, index: usize) -> (String, u32) {
    match &report.recordings[index].outcome {
        RecordingOutcome::Created {
            work_id, version, ..
        } => (work_id.clone(), *version),
        other => panic!("expected created, got {:?}", other),
    }
}

#[tokio::test]
async fn test_artist_batch_keeps_going_past_failed_recording() {
    let pipeline = Pipeline::inline(kansas().with_failing("rec-2"), FakeProvider::answering(0.9));

    let report = submit(&pipeline, TaskKind::artist("Kansas")).await;

    assert_eq!(report.status, TaskStatus::Completed);
    let labels = report.outcome_labels();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels[0], "created");
    assert!(labels[1].starts_with("failed: "), "{}", labels[1]);
    assert_eq!(labels[2], "created");

    assert_eq!(pipeline.store.count_works().unwrap(), 2);
    for index in [0, 2] {
        let (work_id, version) = created(&report, index);
        assert_eq!(version, 1);
        assert_eq!(pipeline.store.count_arrangements(&work_id).unwrap(), 1);
    }
    assert_eq!(
        pipeline.logger.of_type(IngestionEventType::RecordingFailed).len(),
        1
    );
}

#[tokio::test]
async fn test_stalled_recording_fails_alone_under_deadline() {
    let pipeline = Pipeline::inline_with_deadline(
        kansas(),
        FakeProvider::answering(0.9).stalling_on("Dust in the Wind"),
        Duration::from_millis(300),
    );

    let report = submit(&pipeline, TaskKind::artist("Kansas")).await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.failure, None);
    assert_eq!(
        report.outcome_labels(),
        vec!["created", "failed: deadline exceeded", "created"]
    );
    assert_eq!(report.recordings[1].title.as_deref(), Some("Dust in the Wind"));
    assert_eq!(pipeline.store.count_works().unwrap(), 3);
    for index in [0, 2] {
        let (work_id, _) = created(&report, index);
        assert_eq!(pipeline.store.count_arrangements(&work_id).unwrap(), 1);
    }
    assert_eq!(
        pipeline.logger.of_type(IngestionEventType::RecordingFailed).len(),
        1
    );
}

#[tokio::test]
async fn test_executions_and_attempts_are_counted() {
    let attempts = metrics::GENERATION_ATTEMPTS_TOTAL.with_label_values(&["model-a", "success"]);
    let executions = metrics::TASK_EXECUTIONS_TOTAL
        .with_label_values(&["ingest-single-recording", "completed"]);
    let (attempts_before, executions_before) = (attempts.get(), executions.get());
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.9));

    submit(&pipeline, TaskKind::recording("rec-1", false)).await;

    // other tests share the registry, so only a lower bound holds
    assert!(attempts.get() >= attempts_before + 1.0);
    assert!(executions.get() >= executions_before + 1.0);
    let created = &pipeline.logger.of_type(IngestionEventType::RecordingCreated)[0];
    assert_eq!(created.details["lines"], 3);
}

#[tokio::test]
async fn test_inline_artist_throttles_between_recordings() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.9));

    submit(&pipeline, TaskKind::artist("Kansas")).await;

    assert_eq!(pipeline.throttle_sleeper.waits(), vec![THROTTLE, THROTTLE]);
    assert!(pipeline.backoff_sleeper.waits().is_empty());
}

#[tokio::test]
async fn test_second_ingestion_is_skipped_without_generation() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.9));

    let first = submit(&pipeline, TaskKind::recording("rec-1", false)).await;
    let (work_id, _) = created(&first, 0);
    assert_eq!(pipeline.provider.calls(), vec![MODELS[0]]);

    let second = submit(&pipeline, TaskKind::recording("rec-1", false)).await;
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(
        second.recordings[0].outcome,
        RecordingOutcome::SkippedAlreadyExists {
            work_id: work_id.clone()
        }
    );
    assert_eq!(pipeline.provider.calls().len(), 1);
    assert_eq!(pipeline.store.count_arrangements(&work_id).unwrap(), 1);
}

#[tokio::test]
async fn test_force_adds_next_version() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.9));

    let first = submit(&pipeline, TaskKind::recording("rec-1", false)).await;
    let (work_id, _) = created(&first, 0);

    let forced = submit(&pipeline, TaskKind::recording("rec-1", true)).await;
    let (forced_work, version) = created(&forced, 0);
    assert_eq!(forced_work, work_id);
    assert_eq!(version, 2);

    let versions: Vec<u32> = pipeline
        .store
        .list_arrangements(&work_id)
        .unwrap()
        .iter()
        .map(|a| a.version)
        .collect();
    assert_eq!(versions, vec![1, 2]);
}

#[tokio::test]
async fn test_force_continues_from_highest_existing_version() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.9));
    let work = pipeline
        .store
        .find_or_create_work(&WorkIdentity::catalog(
            "Carry On Wayward Son",
            "Kansas",
            "rec-1",
        ))
        .unwrap();
    let seed = ArrangementContent {
        key: "G".to_string(),
        tempo: 120,
        time_signature: "4/4".to_string(),
        sections: Vec::new(),
        notes: None,
    };
    for _ in 0..5 {
        pipeline.store.create_arrangement(&work.id, &seed).unwrap();
    }

    let report = submit(&pipeline, TaskKind::recording("rec-1", true)).await;

    let (work_id, version) = created(&report, 0);
    assert_eq!(work_id, work.id);
    assert_eq!(version, 6);
}

#[tokio::test]
async fn test_work_matched_by_title_and_artist_gets_catalog_id() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.9));
    let entered = pipeline
        .store
        .find_or_create_work(&WorkIdentity::user_entered("carry on, wayward son", "KANSAS"))
        .unwrap();

    let report = submit(&pipeline, TaskKind::recording("rec-1", false)).await;

    let (work_id, _) = created(&report, 0);
    assert_eq!(work_id, entered.id);
    let work = pipeline.store.get_work(&work_id).unwrap().unwrap();
    assert_eq!(work.external_id.as_deref(), Some("rec-1"));
    assert_eq!(pipeline.store.count_works().unwrap(), 1);
}

#[tokio::test]
async fn test_denylisted_title_creates_nothing() {
    let catalog = FakeCatalog::new().with_recording("rec-9", "Interview with the Band", "Kansas");
    let pipeline = Pipeline::inline(catalog, FakeProvider::answering(0.9));

    let report = submit(&pipeline, TaskKind::recording("rec-9", false)).await;

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(
        report.recordings[0].outcome,
        RecordingOutcome::SkippedDenylisted {
            term: "interview".to_string()
        }
    );
    assert_eq!(pipeline.store.count_works().unwrap(), 0);
    assert!(pipeline.provider.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_recording_fails_task() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.9));

    let report = submit(&pipeline, TaskKind::recording("missing", false)).await;

    assert_eq!(report.status, TaskStatus::Failed);
    assert!(report.failure.unwrap().contains("not found upstream"));
    assert_eq!(pipeline.store.count_works().unwrap(), 0);
}

#[tokio::test]
async fn test_incomplete_metadata_stores_pending_placeholder() {
    let catalog = FakeCatalog::new().with_recording("rec-7", "Untitled Demo", "  ");
    let pipeline = Pipeline::inline(catalog, FakeProvider::answering(0.9));

    let report = submit(&pipeline, TaskKind::recording("rec-7", false)).await;

    let (work_id, version) = created(&report, 0);
    assert_eq!(version, 1);
    assert!(pipeline.provider.calls().is_empty());

    let arrangements = pipeline.store.list_arrangements(&work_id).unwrap();
    let placeholder = &arrangements[0];
    assert_eq!(placeholder.notes.as_deref(), Some("pending=true; source=placeholder"));
    assert_eq!(placeholder.sections.len(), 1);
    assert_eq!(placeholder.sections[0].lines[0].text(), PENDING_MARKER);

    let again = submit(&pipeline, TaskKind::recording("rec-7", false)).await;
    assert_eq!(again.outcome_labels(), vec!["skipped: already_exists"]);
}

#[tokio::test]
async fn test_low_confidence_content_is_redacted() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.4));

    let report = submit(&pipeline, TaskKind::recording("rec-1", false)).await;

    let (work_id, _) = created(&report, 0);
    let arrangement = &pipeline.store.list_arrangements(&work_id).unwrap()[0];
    assert_eq!(
        arrangement.notes.as_deref(),
        Some("confidence=0.40; source=generated:model-a; redacted=true")
    );
    assert_eq!(arrangement.key, "D");
    assert_eq!(arrangement.tempo, 96);
    assert_eq!(arrangement.sections.len(), 2);
    assert_eq!(arrangement.line_count(), 3);
    for line in arrangement.sections.iter().flat_map(|s| s.lines.iter()) {
        assert_eq!(line.text(), REDACTION_MARKER);
    }
    assert_eq!(
        pipeline.logger.of_type(IngestionEventType::ContentRedacted).len(),
        1
    );
}

#[tokio::test]
async fn test_confident_content_is_kept() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::answering(0.85));

    let report = submit(&pipeline, TaskKind::recording("rec-1", false)).await;

    let (work_id, _) = created(&report, 0);
    let arrangement = &pipeline.store.list_arrangements(&work_id).unwrap()[0];
    assert_eq!(
        arrangement.notes.as_deref(),
        Some("confidence=0.85; source=generated:model-a; redacted=false")
    );
    assert_eq!(
        arrangement.sections[0].lines[0].text(),
        "Carry on wayward son"
    );
}

#[tokio::test]
async fn test_filler_lyrics_are_capped_and_redacted() {
    let catalog = FakeCatalog::new()
        .with_recording("rec-1", "Carry On Wayward Son", "Kansas")
        .with_recording("rec-5", "Hey Jude", "The Beatles");
    let pipeline = Pipeline::inline(catalog, FakeProvider::singing(0.95, "Na na na na na na"));

    let flagged = submit(&pipeline, TaskKind::recording("rec-1", false)).await;
    let (work_id, _) = created(&flagged, 0);
    let arrangement = &pipeline.store.list_arrangements(&work_id).unwrap()[0];
    assert_eq!(
        arrangement.notes.as_deref(),
        Some("confidence=0.30; source=generated:model-a; redacted=true; hallucination=true")
    );

    let excepted = submit(&pipeline, TaskKind::recording("rec-5", false)).await;
    let (work_id, _) = created(&excepted, 0);
    let arrangement = &pipeline.store.list_arrangements(&work_id).unwrap()[0];
    assert_eq!(
        arrangement.notes.as_deref(),
        Some("confidence=0.95; source=generated:model-a; redacted=false")
    );
}

#[tokio::test]
async fn test_rate_limited_everywhere_fails_after_backoff() {
    let pipeline = Pipeline::inline(kansas(), FakeProvider::rate_limited());

    let report = submit(&pipeline, TaskKind::recording("rec-1", false)).await;

    assert_eq!(report.status, TaskStatus::Failed);
    let failure = report.failure.unwrap();
    assert!(failure.contains("All 2 models exhausted"), "{}", failure);
    assert!(failure.contains("last model model-b"), "{}", failure);
    assert_eq!(
        pipeline.provider.calls(),
        vec!["model-a", "model-a", "model-b", "model-b"]
    );
    // 30s backoff per model plus a 10s cooldown between them
    assert_eq!(pipeline.backoff_sleeper.total(), Duration::from_secs(70));

    let work = pipeline
        .store
        .find_or_create_work(&WorkIdentity::catalog(
            "Carry On Wayward Son",
            "Kansas",
            "rec-1",
        ))
        .unwrap();
    assert_eq!(pipeline.store.count_arrangements(&work.id).unwrap(), 0);
}

#[tokio::test]
async fn test_durable_artist_fans_out_to_recording_tasks() {
    let pipeline = Pipeline::durable(kansas(), FakeProvider::answering(0.9));
    let broker = pipeline.broker.clone().unwrap();
    assert_eq!(pipeline.queue.mode(), QueueMode::Durable);

    let mut reports = pipeline.queue.subscribe();
    pipeline
        .queue
        .submit_ingestion(TaskKind::artist("Kansas"), "tester")
        .await
        .unwrap();
    assert_eq!(broker.len().await, 1);
    assert!(reports.try_recv().is_err());

    let shutdown = CancellationToken::new();
    let consumer = QueueConsumer::new(pipeline.queue.clone());
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { consumer.run(token).await });

    let collected = next_reports(&mut reports, 4).await;
    shutdown.cancel();
    handle.await.unwrap();

    let artist = collected
        .iter()
        .find(|r| matches!(r.kind, TaskKind::IngestArtist { .. }))
        .unwrap();
    assert_eq!(artist.outcome_labels(), vec!["queued", "queued", "queued"]);
    assert!(pipeline.throttle_sleeper.waits().is_empty());

    let children: Vec<&TaskReport> = collected
        .iter()
        .filter(|r| matches!(r.kind, TaskKind::IngestSingleRecording { .. }))
        .collect();
    assert_eq!(children.len(), 3);
    for child in children {
        assert_eq!(child.status, TaskStatus::Completed);
        assert_eq!(child.outcome_labels(), vec!["created"]);
        let queued = artist
            .recordings
            .iter()
            .any(|r| r.outcome == RecordingOutcome::Queued { task_id: child.task_id.clone() });
        assert!(queued, "child {} was not announced", child.task_id);
    }
    assert_eq!(pipeline.store.count_works().unwrap(), 3);
    assert_eq!(pipeline.queue.mode(), QueueMode::Durable);
}

#[tokio::test]
async fn test_consumer_broker_failure_switches_to_inline() {
    let pipeline = Pipeline::durable(kansas(), FakeProvider::answering(0.9));
    let broker = pipeline.broker.clone().unwrap();
    broker.set_failing(true);

    QueueConsumer::new(pipeline.queue.clone())
        .run(CancellationToken::new())
        .await;
    assert_eq!(pipeline.queue.mode(), QueueMode::Fallback);

    // the broker coming back does not restore durable mode
    broker.set_failing(false);
    let report = submit(&pipeline, TaskKind::recording("rec-1", false)).await;
    assert_eq!(report.outcome_labels(), vec!["created"]);
    assert_eq!(broker.len().await, 0);
    assert_eq!(pipeline.queue.mode(), QueueMode::Fallback);
    assert_eq!(
        pipeline.logger.of_type(IngestionEventType::ModeDowngraded).len(),
        1
    );
}

#[tokio::test]
async fn test_enqueue_failure_runs_task_inline() {
    let pipeline = Pipeline::durable(kansas(), FakeProvider::answering(0.9));
    pipeline.broker.as_ref().unwrap().set_failing(true);

    let report = submit(&pipeline, TaskKind::artist("Kansas")).await;

    assert_eq!(pipeline.queue.mode(), QueueMode::Fallback);
    assert_eq!(report.outcome_labels(), vec!["created", "created", "created"]);
    assert_eq!(pipeline.throttle_sleeper.waits().len(), 2);
}
