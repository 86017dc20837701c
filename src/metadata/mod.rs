//! Recording metadata lookup against an external catalog.

mod musicbrainz;

pub use musicbrainz::MusicBrainzLookup;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalized metadata for one catalog recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMeta {
    pub catalog_id: String,
    pub title: String,
    pub artist: String,
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limited by metadata service")]
    RateLimited,

    #[error("Metadata service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Catalog of recordings.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Recordings matching title and artist. An empty title or artist matches
    /// anything, both empty is an error.
    async fn search(&self, title: &str, artist: &str) -> Result<Vec<RecordingMeta>, LookupError>;

    /// A single recording by catalog id, `None` when the catalog does not know it.
    async fn get_by_id(&self, catalog_id: &str) -> Result<Option<RecordingMeta>, LookupError>;

    fn name(&self) -> &str;
}
