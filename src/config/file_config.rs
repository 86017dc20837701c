use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,

    // Component sections
    pub metadata: Option<MetadataConfig>,
    pub generation: Option<GenerationConfig>,
    pub fidelity: Option<FidelityConfig>,
    pub queue: Option<QueueConfig>,
    pub worker: Option<WorkerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MetadataConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub min_request_interval_ms: Option<u64>,
    pub max_search_results: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Environment variable holding the API key, used when `api_key` is unset.
    pub api_key_env: Option<String>,
    /// Models in priority order.
    pub models: Option<Vec<String>>,
    pub attempt_cap: Option<u32>,
    pub rate_limit_backoff_secs: Option<u64>,
    pub model_cooldown_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FidelityConfig {
    pub default_confidence: Option<f64>,
    pub redaction_threshold: Option<f64>,
    pub hallucination_cap: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct QueueConfig {
    pub broker_url: Option<String>,
    pub queue_key: Option<String>,
    pub consumer_concurrency: Option<usize>,
    pub poll_interval_secs: Option<u64>,
    pub task_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub throttle_delay_secs: Option<u64>,
    pub denylist: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
