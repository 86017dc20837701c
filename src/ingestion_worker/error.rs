use crate::generation::GenerationError;
use crate::metadata::LookupError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("metadata lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("recording {0} not found upstream")]
    NotFoundUpstream(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),

    #[error("deadline exceeded")]
    DeadlineExceeded,
}
