// Library records and provider metadata

use crate::domain::job::JobId;
use crate::domain::queue::RecordRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Book candidate produced by an analysis job (scan or CSV import)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookCandidate {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl BookCandidate {
    /// Identity used to drop duplicate books: the ISBN-13 when one is known,
    /// otherwise the lowercased title and author.
    pub fn dedup_key(&self) -> String {
        match self.isbn.as_deref().and_then(normalize_isbn) {
            Some(isbn) => format!("isbn:{}", isbn),
            None => format!(
                "title_author:{}:{}",
                normalize_text(&self.title).to_lowercase(),
                normalize_text(&self.author).to_lowercase()
            ),
        }
    }
}

/// Trim surrounding whitespace and quotes and collapse inner whitespace
pub fn normalize_text(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Digits-only ISBN-13. An ISBN-10 is re-prefixed with 978 and gets a new
/// check digit; anything that is neither length is rejected.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let clean: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match clean.len() {
        13 if clean.chars().all(|c| c.is_ascii_digit()) => Some(clean),
        10 if clean[..9].chars().all(|c| c.is_ascii_digit()) => {
            let body = format!("978{}", &clean[..9]);
            let sum: u32 = body
                .chars()
                .filter_map(|c| c.to_digit(10))
                .enumerate()
                .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
                .sum();
            Some(format!("{}{}", body, (10 - sum % 10) % 10))
        }
        _ => None,
    }
}

/// Library record persisted after an import stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRecord {
    pub record_ref: RecordRef,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_job: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<i64>,
    pub created_at: i64,
}

impl LibraryRecord {
    pub fn from_candidate(
        record_ref: RecordRef,
        candidate: &BookCandidate,
        source_job: Option<JobId>,
        created_at: i64,
    ) -> Self {
        Self {
            record_ref,
            title: candidate.title.trim().to_string(),
            author: candidate.author.trim().to_string(),
            isbn: candidate.isbn.as_deref().and_then(normalize_isbn),
            source_job,
            metadata: None,
            enriched_at: None,
            created_at,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.enriched_at.is_some()
    }
}

/// Normalized provider result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

/// Provider search query. Params are kept sorted so cache keys are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Author search as issued by warming and `GET /author/{name}`
    pub fn author(name: &str) -> Self {
        Self::new(name.trim()).with_param("type", "author")
    }

    /// Title/author lookup as issued by record enrichment
    pub fn title_author(title: &str, author: &str) -> Self {
        let query = Self::new(title.trim()).with_param("type", "title");
        if author.trim().is_empty() {
            query
        } else {
            query.with_param("author", author.trim())
        }
    }
}
