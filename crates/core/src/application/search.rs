// Cache-first metadata search shared by the HTTP API and record enrichment

use crate::application::constants::SEARCH_CACHE_TTL_MS;
use crate::application::rate_gate::RateGate;
use crate::application::warming::keys::{entity_key, query_hash_key};
use crate::domain::{MetadataRecord, SearchQuery};
use crate::error::Result;
use crate::port::{CacheEntry, MetadataCache, MetadataProvider, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub records: Vec<MetadataRecord>,
    pub cached: bool,
}

pub struct SearchService {
    cache: Arc<dyn MetadataCache>,
    provider: Arc<dyn MetadataProvider>,
    rate_gate: Arc<RateGate>,
    time_provider: Arc<dyn TimeProvider>,
    ttl_ms: i64,
}

impl SearchService {
    pub fn new(
        cache: Arc<dyn MetadataCache>,
        provider: Arc<dyn MetadataProvider>,
        rate_gate: Arc<RateGate>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            cache,
            provider,
            rate_gate,
            time_provider,
            ttl_ms: SEARCH_CACHE_TTL_MS,
        }
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        let key = query_hash_key(query);
        if let Some(records) = self.cached(&key).await {
            return Ok(SearchOutcome {
                records,
                cached: true,
            });
        }

        self.fetch(query, vec![key]).await
    }

    /// Author lookup: the warmed `entity:` key first, then a regular search
    pub async fn author(&self, name: &str) -> Result<SearchOutcome> {
        let entity = entity_key(name);
        if let Some(records) = self.cached(&entity).await {
            return Ok(SearchOutcome {
                records,
                cached: true,
            });
        }

        let query = SearchQuery::author(name);
        let key = query_hash_key(&query);
        if let Some(records) = self.cached(&key).await {
            return Ok(SearchOutcome {
                records,
                cached: true,
            });
        }

        self.fetch(&query, vec![entity, key]).await
    }

    async fn cached(&self, key: &str) -> Option<Vec<MetadataRecord>> {
        let now = self.time_provider.now_millis();
        match self.cache.get(key, now).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(records) => {
                    debug!(key = %key, "Search cache hit");
                    Some(records)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Ignoring undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn fetch(&self, query: &SearchQuery, keys: Vec<String>) -> Result<SearchOutcome> {
        self.rate_gate.acquire().await;
        let records = self.provider.search(query).await?;

        let value = serde_json::to_value(&records)?;
        let entries: Vec<CacheEntry> = keys
            .into_iter()
            .map(|key| CacheEntry::new(key, value.clone()))
            .collect();
        let now = self.time_provider.now_millis();
        if let Err(e) = self.cache.put_all(&entries, self.ttl_ms, now).await {
            warn!(error = %e, "Failed to cache search result");
        }

        Ok(SearchOutcome {
            records,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::metadata_cache::mocks::InMemoryMetadataCache;
    use crate::port::metadata_provider::mocks::MockMetadataProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use std::time::Duration;

    fn service(provider: Arc<MockMetadataProvider>, cache: Arc<InMemoryMetadataCache>) -> SearchService {
        SearchService::new(
            cache,
            provider,
            Arc::new(RateGate::new(Duration::from_secs(1))),
            Arc::new(FixedTimeProvider::new(0)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_search_hits_cache() {
        let provider = Arc::new(MockMetadataProvider::new());
        let service = service(provider.clone(), Arc::new(InMemoryMetadataCache::new()));
        let query = SearchQuery::new("Piranesi").with_param("type", "title");

        let first = service.search(&query).await.unwrap();
        let second = service.search(&query).await.unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.records, second.records);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_author_lookup_fills_both_keys() {
        let provider = Arc::new(MockMetadataProvider::new());
        let cache = Arc::new(InMemoryMetadataCache::new());
        let service = service(provider.clone(), cache.clone());

        service.author("Susanna Clarke").await.unwrap();
        assert_eq!(cache.len(), 2);

        // A plain author search now resolves from the cache
        let outcome = service.search(&SearchQuery::author("Susanna Clarke")).await.unwrap();
        assert!(outcome.cached);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(MockMetadataProvider::new().fail_for("x"));
        let service = service(provider, Arc::new(InMemoryMetadataCache::new()));
        assert!(service.search(&SearchQuery::new("x")).await.is_err());
    }
}
