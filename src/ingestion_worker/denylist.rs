use regex::{Regex, RegexBuilder};

/// Title terms that mark a recording as non-musical content.
#[derive(Debug, Clone)]
pub struct Denylist {
    entries: Vec<(String, Regex)>,
}

impl Denylist {
    /// Each term matches case-insensitively on word boundaries; spaces
    /// inside a term match any run of whitespace.
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Result<Self, regex::Error> {
        let mut entries = Vec::with_capacity(terms.len());
        for term in terms {
            let term = term.as_ref().trim();
            if term.is_empty() {
                continue;
            }
            let words: Vec<String> = term.split_whitespace().map(regex::escape).collect();
            let pattern = format!(r"\b{}\b", words.join(r"\s+"));
            let regex = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
            entries.push((term.to_string(), regex));
        }
        Ok(Self { entries })
    }

    /// The first term found in `title`.
    pub fn matches(&self, title: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, regex)| regex.is_match(title))
            .map(|(term, _)| term.as_str())
    }
}
