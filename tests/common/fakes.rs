//! In-process stand-ins for the catalog, the generative backend and the
//! task broker.

use async_trait::async_trait;
use repertoire_ingest::generation::{
    ArrangementProvider, ArrangementRequest, GenerationOptions, ProviderError,
    StructuredArrangement,
};
use repertoire_ingest::ingestion_queue::{BrokerError, IngestionTask, TaskBroker};
use repertoire_ingest::metadata::{LookupError, MetadataLookup, RecordingMeta};
use repertoire_ingest::work_store::{ArrangementLine, ArrangementSection, SectionKind};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Catalog with a fixed set of recordings. Lookups of ids marked failing
/// return a connection error.
#[derive(Default)]
pub struct FakeCatalog {
    recordings: Vec<RecordingMeta>,
    failing: HashSet<String>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recording(mut self, catalog_id: &str, title: &str, artist: &str) -> Self {
        self.recordings.push(RecordingMeta {
            catalog_id: catalog_id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            duration_seconds: Some(200),
        });
        self
    }

    pub fn with_failing(mut self, catalog_id: &str) -> Self {
        self.failing.insert(catalog_id.to_string());
        self
    }
}

#[async_trait]
impl MetadataLookup for FakeCatalog {
    async fn search(&self, title: &str, artist: &str) -> Result<Vec<RecordingMeta>, LookupError> {
        if title.is_empty() && artist.is_empty() {
            return Err(LookupError::InvalidQuery("empty query".to_string()));
        }
        Ok(self
            .recordings
            .iter()
            .filter(|r| artist.is_empty() || r.artist.eq_ignore_ascii_case(artist))
            .filter(|r| title.is_empty() || r.title.eq_ignore_ascii_case(title))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, catalog_id: &str) -> Result<Option<RecordingMeta>, LookupError> {
        if self.failing.contains(catalog_id) {
            return Err(LookupError::Connection("catalog offline".to_string()));
        }
        Ok(self
            .recordings
            .iter()
            .find(|r| r.catalog_id == catalog_id)
            .cloned())
    }

    fn name(&self) -> &str {
        "fake-catalog"
    }
}

#[derive(Debug, Clone)]
pub enum FakeReply {
    Arrangement {
        confidence: Option<f64>,
        lyric: String,
    },
    RateLimited,
}

/// Gives every model the same reply and remembers which models were asked.
/// Requests for the `stalled` title never answer.
pub struct FakeProvider {
    reply: FakeReply,
    stalled: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn answering(confidence: f64) -> Self {
        Self::new(FakeReply::Arrangement {
            confidence: Some(confidence),
            lyric: "Carry on wayward son".to_string(),
        })
    }

    pub fn singing(confidence: f64, lyric: &str) -> Self {
        Self::new(FakeReply::Arrangement {
            confidence: Some(confidence),
            lyric: lyric.to_string(),
        })
    }

    pub fn rate_limited() -> Self {
        Self::new(FakeReply::RateLimited)
    }

    pub fn stalling_on(mut self, title: &str) -> Self {
        self.stalled = Some(title.to_string());
        self
    }

    fn new(reply: FakeReply) -> Self {
        Self {
            reply,
            stalled: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArrangementProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake-provider"
    }

    async fn generate(
        &self,
        model: &str,
        request: &ArrangementRequest,
        _options: &GenerationOptions,
    ) -> Result<StructuredArrangement, ProviderError> {
        self.calls.lock().unwrap().push(model.to_string());
        if self.stalled.as_deref() == Some(request.title.as_str()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match &self.reply {
            FakeReply::RateLimited => Err(ProviderError::RateLimited),
            FakeReply::Arrangement { confidence, lyric } => Ok(StructuredArrangement {
                key: "D".to_string(),
                tempo: 96,
                time_signature: "4/4".to_string(),
                confidence: *confidence,
                source: None,
                sections: vec![
                    ArrangementSection {
                        kind: SectionKind::Verse,
                        label: Some("Verse 1".to_string()),
                        lines: vec![
                            ArrangementLine::Lyric {
                                text: lyric.clone(),
                                chords: Some("D A Bm G".to_string()),
                            },
                            ArrangementLine::Annotation {
                                text: "let ring".to_string(),
                            },
                        ],
                    },
                    ArrangementSection {
                        kind: SectionKind::Chorus,
                        label: None,
                        lines: vec![ArrangementLine::Lyric {
                            text: "There'll be peace when you are done".to_string(),
                            chords: None,
                        }],
                    },
                ],
            }),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// FIFO broker held in memory. `set_failing(true)` makes every call fail
/// with a connection error.
#[derive(Default)]
pub struct MemoryBroker {
    tasks: tokio::sync::Mutex<VecDeque<IngestionTask>>,
    failing: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    fn check(&self) -> Result<(), BrokerError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BrokerError::Connection("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskBroker for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn enqueue(&self, task: &IngestionTask) -> Result<(), BrokerError> {
        self.check()?;
        self.tasks.lock().await.push_back(task.clone());
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<IngestionTask>, BrokerError> {
        self.check()?;
        if let Some(task) = self.tasks.lock().await.pop_front() {
            return Ok(Some(task));
        }
        tokio::time::sleep(timeout.min(Duration::from_millis(10))).await;
        Ok(None)
    }
}
