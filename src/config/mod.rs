mod file_config;

pub use file_config::{
    FidelityConfig, FileConfig, GenerationConfig, MetadataConfig, QueueConfig, WorkerConfig,
};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DENYLIST: &[&str] = &[
    "interview",
    "commentary",
    "podcast",
    "spoken word",
    "skit",
    "audio commentary",
    "press conference",
];

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub broker_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub metadata: MetadataSettings,
    pub generation: GenerationSettings,
    pub fidelity: FidelitySettings,
    pub queue: QueueSettings,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone)]
pub struct MetadataSettings {
    pub base_url: String,
    pub user_agent: String,
    pub min_request_interval: Duration,
    pub max_search_results: usize,
    pub request_timeout: Duration,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            user_agent: format!("repertoire-ingest/{}", env!("CARGO_PKG_VERSION")),
            // slightly over 1s, MusicBrainz allows one request per second
            min_request_interval: Duration::from_millis(1100),
            max_search_results: 25,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub models: Vec<String>,
    pub attempt_cap: u32,
    pub rate_limit_backoff: Duration,
    pub model_cooldown: Duration,
    pub request_timeout: Duration,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            models: vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()],
            attempt_cap: 2,
            rate_limit_backoff: Duration::from_secs(30),
            model_cooldown: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FidelitySettings {
    pub default_confidence: f64,
    pub redaction_threshold: f64,
    pub hallucination_cap: f64,
}

impl Default for FidelitySettings {
    fn default() -> Self {
        Self {
            default_confidence: 0.7,
            redaction_threshold: 0.6,
            hallucination_cap: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// No broker URL means tasks always run inline.
    pub broker_url: Option<String>,
    pub queue_key: String,
    pub consumer_concurrency: usize,
    pub poll_interval: Duration,
    pub task_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            broker_url: None,
            queue_key: "repertoire:ingestion".to_string(),
            consumer_concurrency: 4,
            poll_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(900),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub throttle_delay: Duration,
    pub denylist: Vec<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            throttle_delay: Duration::from_secs(5),
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let md_file = file.metadata.unwrap_or_default();
        let md_default = MetadataSettings::default();
        let metadata = MetadataSettings {
            base_url: md_file.base_url.unwrap_or(md_default.base_url),
            user_agent: md_file.user_agent.unwrap_or(md_default.user_agent),
            min_request_interval: md_file
                .min_request_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(md_default.min_request_interval),
            max_search_results: md_file
                .max_search_results
                .unwrap_or(md_default.max_search_results),
            request_timeout: md_file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(md_default.request_timeout),
        };

        let gen_file = file.generation.unwrap_or_default();
        let gen_default = GenerationSettings::default();
        let api_key = gen_file.api_key.or_else(|| {
            gen_file
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        });
        let models = gen_file.models.unwrap_or(gen_default.models);
        if models.is_empty() {
            bail!("[generation] models must name at least one model");
        }
        let attempt_cap = gen_file.attempt_cap.unwrap_or(gen_default.attempt_cap);
        if attempt_cap == 0 {
            bail!("[generation] attempt_cap must be at least 1");
        }
        let generation = GenerationSettings {
            base_url: gen_file.base_url.unwrap_or(gen_default.base_url),
            api_key,
            models,
            attempt_cap,
            rate_limit_backoff: gen_file
                .rate_limit_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(gen_default.rate_limit_backoff),
            model_cooldown: gen_file
                .model_cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(gen_default.model_cooldown),
            request_timeout: gen_file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(gen_default.request_timeout),
            temperature: gen_file.temperature.unwrap_or(gen_default.temperature),
        };

        let fid_file = file.fidelity.unwrap_or_default();
        let fid_default = FidelitySettings::default();
        let fidelity = FidelitySettings {
            default_confidence: fid_file
                .default_confidence
                .unwrap_or(fid_default.default_confidence),
            redaction_threshold: fid_file
                .redaction_threshold
                .unwrap_or(fid_default.redaction_threshold),
            hallucination_cap: fid_file
                .hallucination_cap
                .unwrap_or(fid_default.hallucination_cap),
        };
        for (name, value) in [
            ("default_confidence", fidelity.default_confidence),
            ("redaction_threshold", fidelity.redaction_threshold),
            ("hallucination_cap", fidelity.hallucination_cap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("[fidelity] {} must be within 0..=1, got {}", name, value);
            }
        }

        let q_file = file.queue.unwrap_or_default();
        let q_default = QueueSettings::default();
        let queue = QueueSettings {
            broker_url: q_file.broker_url.or_else(|| cli.broker_url.clone()),
            queue_key: q_file.queue_key.unwrap_or(q_default.queue_key),
            consumer_concurrency: q_file
                .consumer_concurrency
                .unwrap_or(q_default.consumer_concurrency)
                .max(1),
            poll_interval: q_file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(q_default.poll_interval),
            task_timeout: q_file
                .task_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(q_default.task_timeout),
            connect_timeout: q_file
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(q_default.connect_timeout),
        };

        let w_file = file.worker.unwrap_or_default();
        let w_default = WorkerSettings::default();
        let worker = WorkerSettings {
            throttle_delay: w_file
                .throttle_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(w_default.throttle_delay),
            denylist: w_file.denylist.unwrap_or(w_default.denylist),
        };

        Ok(Self {
            db_path,
            metadata,
            generation,
            fidelity,
            queue,
            worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CliConfig {
        CliConfig {
            db_path: Some(PathBuf::from("/tmp/cli.db")),
            broker_url: Some("redis://cli:6379".to_string()),
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let config = AppConfig::resolve(&cli(), None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/cli.db"));
        assert_eq!(config.queue.broker_url.as_deref(), Some("redis://cli:6379"));
        assert_eq!(config.generation.attempt_cap, 2);
        assert_eq!(config.generation.rate_limit_backoff, Duration::from_secs(30));
        assert_eq!(config.generation.model_cooldown, Duration::from_secs(10));
        assert_eq!(config.queue.task_timeout, Duration::from_secs(900));
        assert_eq!(config.worker.throttle_delay, Duration::from_secs(5));
        assert_eq!(config.fidelity, FidelitySettings::default());
        assert_eq!(config.worker.denylist.len(), DEFAULT_DENYLIST.len());
    }

    #[test]
    fn test_toml_overrides_cli() {
        let file: FileConfig = toml::from_str(
            r#"
            db_path = "/tmp/file.db"

            [queue]
            broker_url = "redis://file:6379"
            task_timeout_secs = 60

            [generation]
            models = ["small", "large"]
            attempt_cap = 3
            "#,
        )
        .unwrap();

        let config = AppConfig::resolve(&cli(), Some(file)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/file.db"));
        assert_eq!(config.queue.broker_url.as_deref(), Some("redis://file:6379"));
        assert_eq!(config.queue.task_timeout, Duration::from_secs(60));
        assert_eq!(config.generation.models, vec!["small", "large"]);
        assert_eq!(config.generation.attempt_cap, 3);
        // untouched sections keep defaults
        assert_eq!(config.queue.consumer_concurrency, 4);
    }

    #[test]
    fn test_missing_db_path_fails() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_model_list_fails() {
        let file: FileConfig = toml::from_str("[generation]\nmodels = []\n").unwrap();
        assert!(AppConfig::resolve(&cli(), Some(file)).is_err());
    }

    #[test]
    fn test_out_of_range_threshold_fails() {
        let file: FileConfig = toml::from_str("[fidelity]\nredaction_threshold = 1.5\n").unwrap();
        assert!(AppConfig::resolve(&cli(), Some(file)).is_err());
    }

    #[test]
    fn test_api_key_from_env_var() {
        std::env::set_var("REPERTOIRE_TEST_API_KEY", "secret");
        let file: FileConfig =
            toml::from_str("[generation]\napi_key_env = \"REPERTOIRE_TEST_API_KEY\"\n").unwrap();
        let config = AppConfig::resolve(&cli(), Some(file)).unwrap();
        assert_eq!(config.generation.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[worker]\nthrottle_delay_secs = 1\ndenylist = [\"live\"]\n")
            .unwrap();

        let file = FileConfig::load(&path).unwrap();
        let config = AppConfig::resolve(&cli(), Some(file)).unwrap();
        assert_eq!(config.worker.throttle_delay, Duration::from_secs(1));
        assert_eq!(config.worker.denylist, vec!["live"]);
    }
}
