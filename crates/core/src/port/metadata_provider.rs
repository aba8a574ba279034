// Metadata Provider Port (external book metadata search)

use crate::domain::{MetadataRecord, SearchQuery};
use async_trait::async_trait;
use thiserror::Error;

/// Provider call failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Provider unreachable: {0}")]
    Transport(String),

    #[error("Invalid provider response: {0}")]
    Decode(String),

    #[error("Provider call timed out after {0}ms")]
    Timeout(u64),
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataRecord>, ProviderError>;

    async fn search_author(&self, name: &str) -> Result<Vec<MetadataRecord>, ProviderError> {
        self.search(&SearchQuery::author(name)).await
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Returns one synthetic record per query, failing for configured texts
    #[derive(Default)]
    pub struct MockMetadataProvider {
        calls: Mutex<Vec<SearchQuery>>,
        failing: Mutex<HashSet<String>>,
    }

    impl MockMetadataProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_for(self, text: impl Into<String>) -> Self {
            self.failing.lock().unwrap().insert(text.into());
            self
        }

        pub fn calls(&self) -> Vec<SearchQuery> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MetadataProvider for MockMetadataProvider {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataRecord>, ProviderError> {
            self.calls.lock().unwrap().push(query.clone());

            if self.failing.lock().unwrap().contains(&query.text) {
                return Err(ProviderError::Http {
                    status: 503,
                    message: "mock outage".to_string(),
                });
            }

            Ok(vec![MetadataRecord {
                title: format!("Result for {}", query.text),
                authors: vec![query
                    .params
                    .get("author")
                    .cloned()
                    .unwrap_or_else(|| query.text.clone())],
                isbn: None,
                published_year: None,
                cover_url: None,
            }])
        }
    }
}
