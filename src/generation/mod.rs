//! Arrangement generation through interchangeable backing models.

mod backoff;
mod openai;
mod orchestrator;
pub mod prompt;
mod provider;
mod types;

pub use backoff::{BackoffPolicy, InstantSleeper, Sleeper, TokioSleeper};
pub use openai::OpenAiCompatibleProvider;
pub use orchestrator::{
    ArrangementGenerator, AttemptOutcome, GenerationAttempt, GenerationError, GenerationReport,
};
pub use provider::{ArrangementProvider, GenerationOptions, ProviderError};
pub use types::{
    ArrangementRequest, GeneratedArrangement, Message, MessageRole, StructuredArrangement,
    PENDING_MARKER,
};
