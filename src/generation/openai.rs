//! OpenAI-compatible arrangement provider.
//!
//! Works with OpenAI, OpenRouter, vLLM and any other service implementing
//! the chat completions API with JSON response format.

use super::prompt::build_messages;
use super::provider::{ArrangementProvider, GenerationOptions, ProviderError};
use super::types::{ArrangementRequest, Message, StructuredArrangement};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "https://api.openai.com/v1").
    /// * `api_key` - Optional static API key sent as a bearer token.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Connection(e.to_string())
    }
}

fn map_status(status: StatusCode, model: &str, body: String) -> ProviderError {
    match status.as_u16() {
        429 => ProviderError::RateLimited,
        404 => ProviderError::NotFound(model.to_string()),
        401 | 403 => ProviderError::PermissionDenied(body),
        code => ProviderError::Api {
            status: code,
            message: body,
        },
    }
}

#[async_trait]
impl ArrangementProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        model: &str,
        request: &ArrangementRequest,
        options: &GenerationOptions,
    ) -> Result<StructuredArrangement, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: build_messages(request),
            temperature: Some(options.temperature),
            max_tokens: options.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!(
            model = %model,
            title = %request.title,
            artist = %request.artist,
            "Sending arrangement request to OpenAI-compatible API"
        );

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .timeout(options.timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, model, body));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedOutput(format!("Failed to parse completion response: {}", e))
        })?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::MalformedOutput("No content in response".to_string()))?;

        StructuredArrangement::parse(&content)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(ProviderError::Api {
                status: response.status().as_u16(),
                message: "Health check failed".to_string(),
            });
        }
        Ok(())
    }
}

// Chat completions API types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
