//! Arrangement provider trait definition.

use super::types::{ArrangementRequest, StructuredArrangement};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Options for a generation request.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Errors that can occur when asking a provider for an arrangement.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited")]
    RateLimited,

    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("Request timeout")]
    Timeout,
}

impl ProviderError {
    /// Not-found, unsupported and permission errors move on to the next
    /// model without waiting.
    pub fn skips_model(&self) -> bool {
        matches!(
            self,
            ProviderError::NotFound(_) | ProviderError::PermissionDenied(_)
        )
    }
}

/// A generative backend that can serve several named models.
#[async_trait]
pub trait ArrangementProvider: Send + Sync {
    /// Get the provider's name (e.g., "openai").
    fn name(&self) -> &str;

    async fn generate(
        &self,
        model: &str,
        request: &ArrangementRequest,
        options: &GenerationOptions,
    ) -> Result<StructuredArrangement, ProviderError>;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
