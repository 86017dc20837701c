//! Ordered model fallback with rate-limit backoff.

use super::backoff::{BackoffPolicy, Sleeper};
use super::provider::{ArrangementProvider, GenerationOptions, ProviderError};
use super::types::{ArrangementRequest, GeneratedArrangement};
use crate::config::GenerationSettings;
use crate::ingestion_log::{IngestionEvent, IngestionEventType, IngestionLogger};
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    NotFound,
    MalformedOutput,
    OtherError,
}

impl AttemptOutcome {
    fn from_error(error: &ProviderError) -> Self {
        match error {
            ProviderError::RateLimited => AttemptOutcome::RateLimited,
            e if e.skips_model() => AttemptOutcome::NotFound,
            ProviderError::MalformedOutput(_) => AttemptOutcome::MalformedOutput,
            _ => AttemptOutcome::OtherError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::RateLimited => "rate_limited",
            AttemptOutcome::NotFound => "not_found",
            AttemptOutcome::MalformedOutput => "malformed_output",
            AttemptOutcome::OtherError => "other_error",
        }
    }
}

/// One call to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationAttempt {
    pub model: String,
    /// 1-based attempt number on this model.
    pub attempt: u32,
    pub confidence: Option<f64>,
    /// Set once the fidelity filter has looked at the output.
    pub hallucination: Option<bool>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug)]
pub struct GenerationReport {
    pub output: GeneratedArrangement,
    pub attempts: Vec<GenerationAttempt>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No models configured")]
    NoModels,

    #[error("All {models_tried} models exhausted, last model {last_model}: {last_error}")]
    Exhausted {
        last_model: String,
        models_tried: usize,
        #[source]
        last_error: ProviderError,
        attempts: Vec<GenerationAttempt>,
    },
}

pub struct ArrangementGenerator {
    provider: Arc<dyn ArrangementProvider>,
    models: Vec<String>,
    policy: BackoffPolicy,
    options: GenerationOptions,
    sleeper: Arc<dyn Sleeper>,
    logger: Arc<dyn IngestionLogger>,
}

impl ArrangementGenerator {
    pub fn new(
        provider: Arc<dyn ArrangementProvider>,
        models: Vec<String>,
        policy: BackoffPolicy,
        sleeper: Arc<dyn Sleeper>,
        logger: Arc<dyn IngestionLogger>,
    ) -> Self {
        Self {
            provider,
            models,
            policy,
            options: GenerationOptions::default(),
            sleeper,
            logger,
        }
    }

    pub fn from_settings(
        provider: Arc<dyn ArrangementProvider>,
        settings: &GenerationSettings,
        sleeper: Arc<dyn Sleeper>,
        logger: Arc<dyn IngestionLogger>,
    ) -> Self {
        let mut generator = Self::new(
            provider,
            settings.models.clone(),
            BackoffPolicy::new(settings),
            sleeper,
            logger,
        );
        generator.options = GenerationOptions {
            temperature: settings.temperature,
            max_tokens: None,
            timeout: settings.request_timeout,
        };
        generator
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Try each model in order until one returns a usable arrangement.
    ///
    /// Incomplete song metadata short-circuits to a placeholder without
    /// calling the provider.
    pub async fn generate(
        &self,
        request: &ArrangementRequest,
    ) -> Result<GenerationReport, GenerationError> {
        if !request.is_complete() {
            self.logger.log(
                IngestionEvent::new(
                    IngestionEventType::PlaceholderGenerated,
                    "Song metadata incomplete, using pending placeholder",
                )
                .with_details(serde_json::json!({
                    "title": request.title,
                    "artist": request.artist,
                })),
            );
            return Ok(GenerationReport {
                output: GeneratedArrangement::placeholder(),
                attempts: Vec::new(),
            });
        }

        let mut attempts = Vec::new();
        let mut last_failure: Option<(String, ProviderError)> = None;

        for (index, model) in self.models.iter().enumerate() {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let result = self.provider.generate(model, request, &self.options).await;

                let error = match result {
                    Ok(arrangement) => {
                        let confidence = arrangement.confidence.map(|c| c.clamp(0.0, 1.0));
                        attempts.push(GenerationAttempt {
                            model: model.clone(),
                            attempt,
                            confidence,
                            hallucination: None,
                            outcome: AttemptOutcome::Success,
                        });
                        self.log_attempt(model, attempt, "success");
                        metrics::record_generation_attempt(model, AttemptOutcome::Success.as_str());
                        return Ok(GenerationReport {
                            output: GeneratedArrangement {
                                arrangement,
                                model: Some(model.clone()),
                            },
                            attempts,
                        });
                    }
                    Err(e) => e,
                };

                let outcome = AttemptOutcome::from_error(&error);
                attempts.push(GenerationAttempt {
                    model: model.clone(),
                    attempt,
                    confidence: None,
                    hallucination: None,
                    outcome,
                });
                self.log_attempt(model, attempt, &error.to_string());
                metrics::record_generation_attempt(model, outcome.as_str());

                if matches!(error, ProviderError::RateLimited) {
                    if self.policy.should_retry(attempt) {
                        self.wait(self.policy.rate_limit_backoff, model, "rate_limit_backoff")
                            .await;
                        continue;
                    }
                    if let Some(cooldown) = self.policy.cooldown_after(index, self.models.len()) {
                        self.wait(cooldown, model, "model_cooldown").await;
                    }
                }

                self.logger.log(
                    IngestionEvent::new(
                        IngestionEventType::ModelSkipped,
                        format!("Giving up on model {}: {}", model, error),
                    )
                    .with_details(serde_json::json!({
                        "model": model,
                        "outcome": outcome,
                        "attempts": attempt,
                    })),
                );
                last_failure = Some((model.clone(), error));
                break;
            }
        }

        match last_failure {
            Some((last_model, last_error)) => Err(GenerationError::Exhausted {
                last_model,
                models_tried: self.models.len(),
                last_error,
                attempts,
            }),
            None => Err(GenerationError::NoModels),
        }
    }

    fn log_attempt(&self, model: &str, attempt: u32, result: &str) {
        self.logger.log(
            IngestionEvent::new(
                IngestionEventType::GenerationAttempt,
                format!("Model {} attempt {}: {}", model, attempt, result),
            )
            .with_details(serde_json::json!({
                "model": model,
                "attempt": attempt,
            })),
        );
    }

    async fn wait(&self, duration: std::time::Duration, model: &str, reason: &str) {
        self.logger.log(
            IngestionEvent::new(
                IngestionEventType::BackoffWait,
                format!("Waiting {:?} ({}) after model {}", duration, reason, model),
            )
            .with_details(serde_json::json!({
                "model": model,
                "reason": reason,
                "wait_ms": duration.as_millis() as u64,
            })),
        );
        self.sleeper.sleep(duration).await;
    }
}
