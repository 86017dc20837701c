//! A fully wired pipeline over in-memory fakes.

use super::fakes::{FakeCatalog, FakeProvider, MemoryBroker};
use repertoire_ingest::config::{QueueSettings, WorkerSettings};
use repertoire_ingest::fidelity::FidelityFilter;
use repertoire_ingest::generation::{ArrangementGenerator, BackoffPolicy, InstantSleeper};
use repertoire_ingest::ingestion_log::MemoryLogger;
use repertoire_ingest::ingestion_queue::{IngestionQueue, TaskBroker};
use repertoire_ingest::ingestion_worker::IngestionWorker;
use repertoire_ingest::work_store::SqliteWorkStore;
use std::sync::Arc;
use std::time::Duration;

pub const MODELS: &[&str] = &["model-a", "model-b"];
pub const THROTTLE: Duration = Duration::from_secs(5);

pub struct Pipeline {
    pub store: Arc<SqliteWorkStore>,
    pub provider: Arc<FakeProvider>,
    /// Waits requested by the generator's backoff.
    pub backoff_sleeper: Arc<InstantSleeper>,
    /// Waits requested between inline recordings.
    pub throttle_sleeper: Arc<InstantSleeper>,
    pub logger: Arc<MemoryLogger>,
    pub broker: Option<Arc<MemoryBroker>>,
    pub queue: IngestionQueue,
}

impl Pipeline {
    /// Fallback mode: every submit runs inline.
    pub fn inline(catalog: FakeCatalog, provider: FakeProvider) -> Self {
        Self::build(catalog, provider, None, QueueSettings::default())
    }

    /// Fallback mode with a short task deadline.
    pub fn inline_with_deadline(
        catalog: FakeCatalog,
        provider: FakeProvider,
        task_timeout: Duration,
    ) -> Self {
        let settings = QueueSettings {
            task_timeout,
            ..QueueSettings::default()
        };
        Self::build(catalog, provider, None, settings)
    }

    /// Durable mode over a memory broker.
    pub fn durable(catalog: FakeCatalog, provider: FakeProvider) -> Self {
        let settings = QueueSettings {
            broker_url: Some("memory://".to_string()),
            poll_interval: Duration::from_millis(100),
            consumer_concurrency: 2,
            ..QueueSettings::default()
        };
        Self::build(catalog, provider, Some(Arc::new(MemoryBroker::new())), settings)
    }

    fn build(
        catalog: FakeCatalog,
        provider: FakeProvider,
        broker: Option<Arc<MemoryBroker>>,
        settings: QueueSettings,
    ) -> Self {
        let store = Arc::new(SqliteWorkStore::in_memory().unwrap());
        let provider = Arc::new(provider);
        let backoff_sleeper = Arc::new(InstantSleeper::new());
        let throttle_sleeper = Arc::new(InstantSleeper::new());
        let logger = Arc::new(MemoryLogger::new());

        let generator = ArrangementGenerator::new(
            provider.clone(),
            MODELS.iter().map(|m| m.to_string()).collect(),
            BackoffPolicy::default(),
            backoff_sleeper.clone(),
            logger.clone(),
        );
        let worker_settings = WorkerSettings {
            throttle_delay: THROTTLE,
            ..WorkerSettings::default()
        };
        let worker = IngestionWorker::new(
            Arc::new(catalog),
            generator,
            FidelityFilter::default(),
            store.clone(),
            &worker_settings,
            throttle_sleeper.clone(),
            logger.clone(),
        )
        .unwrap();

        let queue = IngestionQueue::new(
            broker.clone().map(|b| b as Arc<dyn TaskBroker>),
            Arc::new(worker),
            settings,
            logger.clone(),
        );

        Self {
            store,
            provider,
            backoff_sleeper,
            throttle_sleeper,
            logger,
            broker,
            queue,
        }
    }
}
