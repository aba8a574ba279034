//! Cache key scheme shared by warming and on-demand search.
//!
//! - `entity:{normalized name}`
//! - `query-hash:{base64(query text)}:{base64(sorted params as JSON)}`

use crate::domain::SearchQuery;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Lowercase, trimmed, inner whitespace collapsed
pub fn normalize_entity(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn entity_key(name: &str) -> String {
    format!("entity:{}", normalize_entity(name))
}

pub fn query_hash_key(query: &SearchQuery) -> String {
    // BTreeMap serializes in key order, so equal params give equal keys
    let params = serde_json::to_string(&query.params).unwrap_or_default();
    format!(
        "query-hash:{}:{}",
        STANDARD.encode(query.text.trim()),
        STANDARD.encode(params)
    )
}
