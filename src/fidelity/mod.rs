//! Confidence assignment, hallucination detection and redaction of
//! generated arrangements.

mod signatures;

pub use signatures::{HallucinationSignature, DEFAULT_SIGNATURES};

use crate::config::FidelitySettings;
use crate::generation::GeneratedArrangement;
use crate::work_store::{normalize, ArrangementContent, ArrangementSection};

pub const REDACTION_MARKER: &str = "[restricted due to low confidence]";

#[derive(Debug, Clone, PartialEq)]
pub struct FidelityVerdict {
    pub confidence: f64,
    pub source: String,
    /// Phrase of the signature that capped the confidence.
    pub hallucination: Option<&'static str>,
    pub redacted: bool,
    pub placeholder: bool,
}

impl FidelityVerdict {
    /// `key=value` pairs stored in the arrangement notes.
    pub fn render_notes(&self) -> String {
        if self.placeholder {
            return format!("pending=true; source={}", self.source);
        }
        let mut notes = format!(
            "confidence={:.2}; source={}; redacted={}",
            self.confidence, self.source, self.redacted
        );
        if self.hallucination.is_some() {
            notes.push_str("; hallucination=true");
        }
        notes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredArrangement {
    pub content: ArrangementContent,
    pub verdict: FidelityVerdict,
}

#[derive(Debug, Clone)]
pub struct FidelityFilter {
    settings: FidelitySettings,
    signatures: Vec<HallucinationSignature>,
}

impl Default for FidelityFilter {
    fn default() -> Self {
        Self::new(FidelitySettings::default())
    }
}

impl FidelityFilter {
    pub fn new(settings: FidelitySettings) -> Self {
        Self {
            settings,
            signatures: DEFAULT_SIGNATURES.to_vec(),
        }
    }

    pub fn with_signatures(mut self, signatures: Vec<HallucinationSignature>) -> Self {
        self.signatures = signatures;
        self
    }

    fn detect_signature(
        &self,
        sections: &[ArrangementSection],
        title: &str,
    ) -> Option<&'static str> {
        let texts: Vec<String> = sections
            .iter()
            .flat_map(|s| s.lines.iter())
            .map(|line| normalize(line.text()))
            .collect();

        self.signatures
            .iter()
            .find(|sig| !sig.excepted_by_title(title) && texts.iter().any(|t| sig.matches(t)))
            .map(|sig| sig.phrase)
    }

    /// Sanitize generated output for the song `title`. Pure: the same input
    /// always yields the same output.
    pub fn apply(&self, generated: &GeneratedArrangement, title: &str) -> FilteredArrangement {
        let arrangement = &generated.arrangement;
        let source = arrangement
            .source
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| match &generated.model {
                Some(model) => format!("generated:{}", model),
                None => "placeholder".to_string(),
            });

        let mut content = ArrangementContent {
            key: arrangement.key.clone(),
            tempo: arrangement.tempo,
            time_signature: arrangement.time_signature.clone(),
            sections: arrangement.sections.clone(),
            notes: None,
        };

        if generated.is_placeholder() {
            let verdict = FidelityVerdict {
                confidence: 0.0,
                source,
                hallucination: None,
                redacted: false,
                placeholder: true,
            };
            content.notes = Some(verdict.render_notes());
            return FilteredArrangement { content, verdict };
        }

        let mut confidence = match arrangement.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => self.settings.default_confidence,
        };

        let hallucination = self.detect_signature(&arrangement.sections, title);
        if hallucination.is_some() {
            confidence = confidence.min(self.settings.hallucination_cap);
        }

        let redacted = confidence < self.settings.redaction_threshold;
        if redacted {
            for section in content.sections.iter_mut() {
                for line in section.lines.iter_mut() {
                    *line = line.with_text(REDACTION_MARKER);
                }
            }
        }

        let verdict = FidelityVerdict {
            confidence,
            source,
            hallucination,
            redacted,
            placeholder: false,
        };
        content.notes = Some(verdict.render_notes());
        FilteredArrangement { content, verdict }
    }
}
