//! MusicBrainz WS/2 client for recording search and lookup.
//!
//! Requests are spaced by `min_request_interval` per MusicBrainz API policy.

use super::{LookupError, MetadataLookup, RecordingMeta};
use crate::config::MetadataSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

const MAX_PAGE_SIZE: usize = 100;

pub struct MusicBrainzLookup {
    client: Client,
    settings: MetadataSettings,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

#[derive(Deserialize)]
struct MbRecording {
    id: String,
    title: String,
    /// Milliseconds.
    length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Deserialize)]
struct MbArtistCredit {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

impl MbRecording {
    fn into_meta(self) -> RecordingMeta {
        let artist: String = self
            .artist_credit
            .iter()
            .map(|c| format!("{}{}", c.name, c.joinphrase))
            .collect();
        RecordingMeta {
            catalog_id: self.id,
            title: self.title,
            artist: artist.trim().to_string(),
            duration_seconds: self.length.map(|ms| (ms / 1000) as u32),
        }
    }
}

/// Quote a value for a Lucene field query.
fn lucene_phrase(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn build_query(title: &str, artist: &str) -> Result<String, LookupError> {
    let mut clauses = Vec::with_capacity(2);
    if !title.trim().is_empty() {
        clauses.push(format!("recording:{}", lucene_phrase(title.trim())));
    }
    if !artist.trim().is_empty() {
        clauses.push(format!("artist:{}", lucene_phrase(artist.trim())));
    }
    if clauses.is_empty() {
        return Err(LookupError::InvalidQuery(
            "title and artist cannot both be empty".to_string(),
        ));
    }
    Ok(clauses.join(" AND "))
}

impl MusicBrainzLookup {
    pub fn new(settings: MetadataSettings) -> Result<Self, LookupError> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| LookupError::Connection(e.to_string()))?;

        let last_request = Instant::now()
            .checked_sub(settings.min_request_interval)
            .unwrap_or_else(Instant::now);
        Ok(Self {
            client,
            settings,
            last_request: Mutex::new(last_request),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.settings.min_request_interval {
            tokio::time::sleep(self.settings.min_request_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, LookupError> {
        self.rate_limit().await;
        debug!("MusicBrainz GET {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Connection(format!("request timed out: {}", e))
            } else {
                LookupError::Connection(e.to_string())
            }
        })?;
        if response.status().as_u16() == 503 {
            return Err(LookupError::RateLimited);
        }
        Ok(response)
    }
}

#[async_trait]
impl MetadataLookup for MusicBrainzLookup {
    async fn search(&self, title: &str, artist: &str) -> Result<Vec<RecordingMeta>, LookupError> {
        let query = build_query(title, artist)?;
        let max = self.settings.max_search_results;
        let mut results = Vec::new();
        let mut offset = 0;

        while results.len() < max {
            let limit = (max - results.len()).min(MAX_PAGE_SIZE);
            let url = format!(
                "{}/recording?query={}&fmt=json&limit={}&offset={}",
                self.settings.base_url,
                urlencoding::encode(&query),
                limit,
                offset
            );
            let response = self.get(&url).await?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LookupError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
            let page: RecordingSearchResponse = response
                .json()
                .await
                .map_err(|e| LookupError::InvalidResponse(e.to_string()))?;

            let page_len = page.recordings.len();
            offset += page_len;
            results.extend(page.recordings.into_iter().map(MbRecording::into_meta));

            if page_len == 0 || offset >= page.count {
                break;
            }
        }

        results.truncate(max);
        debug!(
            "MusicBrainz search '{}' returned {} recordings",
            query,
            results.len()
        );
        Ok(results)
    }

    async fn get_by_id(&self, catalog_id: &str) -> Result<Option<RecordingMeta>, LookupError> {
        if catalog_id.trim().is_empty() {
            return Err(LookupError::InvalidQuery("empty catalog id".to_string()));
        }
        let url = format!(
            "{}/recording/{}?inc=artist-credits&fmt=json",
            self.settings.base_url,
            urlencoding::encode(catalog_id.trim())
        );
        let response = self.get(&url).await?;
        let status = response.status();

        // MusicBrainz answers 400 for ids that are not valid MBIDs.
        if status.as_u16() == 404 || status.as_u16() == 400 {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let recording: MbRecording = response
            .json()
            .await
            .map_err(|e| LookupError::InvalidResponse(e.to_string()))?;
        Ok(Some(recording.into_meta()))
    }

    fn name(&self) -> &str {
        "musicbrainz"
    }
}
