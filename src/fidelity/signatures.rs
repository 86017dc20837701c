//! Known fabricated-content signatures.

use crate::work_store::normalize;

/// A phrase that shows up when a model invents content instead of recalling
/// it. `exceptions` are title words that make the phrase legitimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HallucinationSignature {
    pub phrase: &'static str,
    pub exceptions: &'static [&'static str],
}

pub const DEFAULT_SIGNATURES: &[HallucinationSignature] = &[
    HallucinationSignature {
        phrase: "as an ai language model",
        exceptions: &[],
    },
    HallucinationSignature {
        phrase: "i don't have access to the lyrics",
        exceptions: &[],
    },
    HallucinationSignature {
        phrase: "lyrics not available",
        exceptions: &[],
    },
    HallucinationSignature {
        phrase: "this is a fictional",
        exceptions: &[],
    },
    HallucinationSignature {
        phrase: "la la la la la",
        exceptions: &["la"],
    },
    HallucinationSignature {
        phrase: "na na na na na",
        exceptions: &["na", "hey"],
    },
    HallucinationSignature {
        phrase: "yeah yeah yeah yeah yeah",
        exceptions: &["yeah"],
    },
];

impl HallucinationSignature {
    /// Whole-word, case-insensitive match against already normalized text.
    pub fn matches(&self, normalized_text: &str) -> bool {
        let phrase = normalize(self.phrase);
        format!(" {} ", normalized_text).contains(&format!(" {} ", phrase))
    }

    pub fn excepted_by_title(&self, title: &str) -> bool {
        let title = normalize(title);
        title
            .split(' ')
            .any(|word| self.exceptions.iter().any(|e| *e == word))
    }
}
