//! Ingestion state machine: discovery, guard check, generation, filtering
//! and persistence of arrangements.

mod denylist;
mod error;
mod state;
mod worker;

pub use denylist::Denylist;
pub use error::IngestionError;
pub use state::RecordingState;
pub use worker::IngestionWorker;
