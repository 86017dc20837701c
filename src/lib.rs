//! Repertoire ingestion library
//!
//! Exposes the pipeline modules to the `ingest-worker` binary and to tests.

pub mod config;
pub mod fidelity;
pub mod generation;
pub mod ingestion_log;
pub mod ingestion_queue;
pub mod ingestion_worker;
pub mod metadata;
pub mod metrics;
pub mod sqlite_persistence;
pub mod work_store;

// Re-export commonly used types for convenience
pub use ingestion_queue::{IngestionQueue, QueueConsumer, TaskKind, TaskReport};
pub use ingestion_worker::IngestionWorker;
pub use work_store::{SqliteWorkStore, WorkStore};
