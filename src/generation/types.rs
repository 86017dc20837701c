//! Types exchanged with generative providers.

use super::provider::ProviderError;
use crate::work_store::{ArrangementLine, ArrangementSection, SectionKind};
use serde::{Deserialize, Serialize};

/// Role of a message in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// The song an arrangement is requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrangementRequest {
    pub title: String,
    pub artist: String,
}

impl ArrangementRequest {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.artist.trim().is_empty()
    }
}

/// Provider output in the structured contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredArrangement {
    pub key: String,
    pub tempo: u32,
    pub time_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub sections: Vec<ArrangementSection>,
}

impl StructuredArrangement {
    /// Parse raw completion text. Only a bare JSON object is accepted; prose
    /// around it or markdown fences make the output malformed.
    pub fn parse(raw: &str) -> Result<Self, ProviderError> {
        let trimmed = raw.trim();
        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            return Err(ProviderError::MalformedOutput(
                "output is not a bare JSON object".to_string(),
            ));
        }
        let parsed: StructuredArrangement = serde_json::from_str(trimmed)
            .map_err(|e| ProviderError::MalformedOutput(e.to_string()))?;
        if parsed.sections.is_empty() {
            return Err(ProviderError::MalformedOutput(
                "arrangement has no sections".to_string(),
            ));
        }
        if parsed.key.trim().is_empty() || parsed.time_signature.trim().is_empty() {
            return Err(ProviderError::MalformedOutput(
                "key and time_signature are required".to_string(),
            ));
        }
        Ok(parsed)
    }

    pub fn line_count(&self) -> usize {
        self.sections.iter().map(|s| s.lines.len()).sum()
    }
}

pub const PENDING_MARKER: &str = "[arrangement pending: song metadata incomplete]";

/// What the generator hands to the fidelity filter.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedArrangement {
    pub arrangement: StructuredArrangement,
    /// Model that produced the arrangement, `None` for a placeholder.
    pub model: Option<String>,
}

impl GeneratedArrangement {
    /// One section holding a single annotation line with the pending marker.
    pub fn placeholder() -> Self {
        Self {
            arrangement: StructuredArrangement {
                key: "unknown".to_string(),
                tempo: 0,
                time_signature: "4/4".to_string(),
                confidence: None,
                source: Some("placeholder".to_string()),
                sections: vec![ArrangementSection {
                    kind: SectionKind::Other,
                    label: Some("Pending".to_string()),
                    lines: vec![ArrangementLine::Annotation {
                        text: PENDING_MARKER.to_string(),
                    }],
                }],
            },
            model: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.model.is_none()
    }
}
