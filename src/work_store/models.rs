//! Work and arrangement models.

use serde::{Deserialize, Serialize};

/// Where a Work's identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Catalog,
    UserEntered,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Catalog => "catalog",
            Provenance::UserEntered => "user_entered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "catalog" => Some(Provenance::Catalog),
            "user_entered" => Some(Provenance::UserEntered),
            _ => None,
        }
    }
}

/// Canonical song identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
    pub provenance: Provenance,
    pub created_at: i64,
}

/// Lookup key for `find_or_create_work`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkIdentity {
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
    pub provenance: Provenance,
}

impl WorkIdentity {
    pub fn catalog(title: &str, artist: &str, external_id: &str) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            external_id: Some(external_id.to_string()),
            provenance: Provenance::Catalog,
        }
    }

    pub fn user_entered(title: &str, artist: &str) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            external_id: None,
            provenance: Provenance::UserEntered,
        }
    }

    pub fn normalized_title(&self) -> String {
        normalize(&self.title)
    }

    pub fn normalized_artist(&self) -> String {
        normalize(&self.artist)
    }
}

/// Lowercases, turns anything that is not alphanumeric into a space and
/// collapses whitespace.
pub fn normalize(text: &str) -> String {
    let replaced: String = text
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Intro,
    Verse,
    PreChorus,
    Chorus,
    Bridge,
    Solo,
    Interlude,
    Outro,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArrangementLine {
    Lyric {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chords: Option<String>,
    },
    Annotation {
        text: String,
    },
}

impl ArrangementLine {
    pub fn text(&self) -> &str {
        match self {
            ArrangementLine::Lyric { text, .. } | ArrangementLine::Annotation { text } => text,
        }
    }

    pub fn is_lyric(&self) -> bool {
        matches!(self, ArrangementLine::Lyric { .. })
    }

    /// Same line kind and chords, different text.
    pub fn with_text(&self, new_text: &str) -> Self {
        match self {
            ArrangementLine::Lyric { chords, .. } => ArrangementLine::Lyric {
                text: new_text.to_string(),
                chords: chords.clone(),
            },
            ArrangementLine::Annotation { .. } => ArrangementLine::Annotation {
                text: new_text.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangementSection {
    pub kind: SectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub lines: Vec<ArrangementLine>,
}

/// Generated content ready to be persisted as a new arrangement version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrangementContent {
    pub key: String,
    pub tempo: u32,
    pub time_signature: String,
    pub sections: Vec<ArrangementSection>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub id: String,
    pub work_id: String,
    pub version: u32,
    pub key: String,
    pub tempo: u32,
    pub time_signature: String,
    pub sections: Vec<ArrangementSection>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Arrangement {
    pub fn line_count(&self) -> usize {
        self.sections.iter().map(|s| s.lines.len()).sum()
    }
}
