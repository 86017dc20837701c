//! Common test infrastructure
//!
//! Tests build a `Pipeline` from a `FakeCatalog` and a `FakeProvider` and
//! drive it through the public `IngestionQueue`.

mod fakes;
mod harness;

#[allow(unused_imports)]
pub use fakes::{FakeCatalog, FakeProvider, FakeReply, MemoryBroker};
#[allow(unused_imports)]
pub use harness::{Pipeline, MODELS, THROTTLE};
