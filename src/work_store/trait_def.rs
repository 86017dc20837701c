//! WorkStore trait definition.

use super::models::{Arrangement, ArrangementContent, Work, WorkIdentity};
use anyhow::Result;

/// Storage for canonical works and their generated arrangements.
pub trait WorkStore: Send + Sync {
    /// Find a work by external id, then by normalized title and artist.
    /// Creates it when neither matches. A work found by title and artist
    /// with no external id gets the identity's external id filled in.
    fn find_or_create_work(&self, identity: &WorkIdentity) -> Result<Work>;

    fn get_work(&self, work_id: &str) -> Result<Option<Work>>;

    fn count_works(&self) -> Result<usize>;

    /// Number of arrangements stored for a work. Zero means the work still
    /// needs generation.
    fn count_arrangements(&self, work_id: &str) -> Result<usize>;

    /// Persist a new arrangement with version = max existing + 1.
    fn create_arrangement(&self, work_id: &str, content: &ArrangementContent)
        -> Result<Arrangement>;

    /// Arrangements of a work, oldest version first.
    fn list_arrangements(&self, work_id: &str) -> Result<Vec<Arrangement>>;
}
