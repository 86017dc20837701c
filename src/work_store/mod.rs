//! Canonical works and their generated arrangements.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{
    normalize, Arrangement, ArrangementContent, ArrangementLine, ArrangementSection, Provenance,
    SectionKind, Work, WorkIdentity,
};
pub use store::SqliteWorkStore;
pub use trait_def::WorkStore;
