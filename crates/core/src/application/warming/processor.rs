// Bulk metadata warming: one resumable, rate-limited batch per run

use crate::application::constants::{
    DEFAULT_CACHE_TTL_MS, DEFAULT_WARMING_BATCH_SIZE, DEFAULT_WARMING_INTERVAL,
    WARMING_CURSOR_NAME,
};
use crate::application::rate_gate::RateGate;
use crate::application::warming::keys::{entity_key, query_hash_key};
use crate::domain::{BatchCursor, SearchQuery};
use crate::port::{CacheEntry, CursorStore, EntitySource, MetadataCache, MetadataProvider, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct WarmingConfig {
    pub batch_size: usize,
    pub interval: Duration,
    pub cache_ttl_ms: i64,
    pub cursor_name: String,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_WARMING_BATCH_SIZE,
            interval: DEFAULT_WARMING_INTERVAL,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            cursor_name: WARMING_CURSOR_NAME.to_string(),
        }
    }
}

/// Outcome of one warming run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmingReport {
    /// Half-open slice `[start_index, end_index)` attempted in this run
    pub start_index: u64,
    pub end_index: u64,
    pub total_count: u64,
    pub processed: usize,
    pub failed: usize,
    /// The previous cycle was complete and this run started over at 0
    pub cycle_reset: bool,
    pub cycle_started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WarmingReport {
    fn degraded(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

pub struct WarmingProcessor {
    entities: Arc<dyn EntitySource>,
    cursors: Arc<dyn CursorStore>,
    cache: Arc<dyn MetadataCache>,
    provider: Arc<dyn MetadataProvider>,
    rate_gate: Arc<RateGate>,
    time_provider: Arc<dyn TimeProvider>,
    config: WarmingConfig,
}

impl WarmingProcessor {
    pub fn new(
        entities: Arc<dyn EntitySource>,
        cursors: Arc<dyn CursorStore>,
        cache: Arc<dyn MetadataCache>,
        provider: Arc<dyn MetadataProvider>,
        rate_gate: Arc<RateGate>,
        time_provider: Arc<dyn TimeProvider>,
        config: WarmingConfig,
    ) -> Self {
        Self {
            entities,
            cursors,
            cache,
            provider,
            rate_gate,
            time_provider,
            config,
        }
    }

    pub fn config(&self) -> &WarmingConfig {
        &self.config
    }

    pub fn entities(&self) -> &Arc<dyn EntitySource> {
        &self.entities
    }

    pub async fn cursor(&self) -> crate::error::Result<Option<BatchCursor>> {
        self.cursors.load(&self.config.cursor_name).await
    }

    /// Warm the next batch. Never fails: problems are counted in the report.
    pub async fn run_once(&self) -> WarmingReport {
        let now = self.time_provider.now_millis();

        let entities = match self.entities.load_entities().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Warming skipped: entity list unavailable");
                return WarmingReport::degraded(format!("entity list unavailable: {}", e));
            }
        };
        let saved = match self.cursors.load(&self.config.cursor_name).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, "Warming skipped: cursor unavailable");
                return WarmingReport::degraded(format!("cursor unavailable: {}", e));
            }
        };

        let len = entities.len() as u64;
        let mut cursor = BatchCursor::resume(saved, len, now);
        let cycle_reset = saved.is_some_and(|s| s.current_index != 0 && cursor.current_index == 0);
        let (start, end) = cursor.batch_range(self.config.batch_size as u64);

        info!(
            start,
            end,
            total = len,
            cycle_reset,
            "Warming batch started"
        );

        let mut report = WarmingReport {
            start_index: start,
            end_index: end,
            total_count: len,
            cycle_reset,
            cycle_started_at: cursor.started_at,
            ..WarmingReport::default()
        };

        for name in &entities[start as usize..end as usize] {
            match self.warm_entity(name, now).await {
                Ok(()) => report.processed += 1,
                Err(message) => {
                    warn!(entity = %name, error = %message, "Warming entity failed, skipping");
                    report.failed += 1;
                }
            }
        }

        cursor.advance_to(end);
        if let Err(e) = self.cursors.save(&self.config.cursor_name, &cursor).await {
            warn!(error = %e, "Failed to persist warming cursor");
            report.error = Some(format!("cursor not saved: {}", e));
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            next_index = end,
            "Warming batch finished"
        );
        report
    }

    async fn warm_entity(&self, name: &str, now: i64) -> Result<(), String> {
        self.rate_gate.acquire().await;

        let records = self
            .provider
            .search_author(name)
            .await
            .map_err(|e| e.to_string())?;
        let value = serde_json::to_value(&records).map_err(|e| e.to_string())?;

        // Both keys in one write: a reader never sees only one of them
        let entries = [
            CacheEntry::new(entity_key(name), value.clone()),
            CacheEntry::new(query_hash_key(&SearchQuery::author(name)), value),
        ];
        self.cache
            .put_all(&entries, self.config.cache_ttl_ms, now)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::cursor_store::mocks::InMemoryCursorStore;
    use crate::port::entity_source::mocks::InMemoryEntitySource;
    use crate::port::metadata_cache::mocks::InMemoryMetadataCache;
    use crate::port::metadata_provider::mocks::MockMetadataProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    struct Fixture {
        processor: WarmingProcessor,
        cursors: Arc<InMemoryCursorStore>,
        cache: Arc<InMemoryMetadataCache>,
        provider: Arc<MockMetadataProvider>,
        clock: Arc<FixedTimeProvider>,
    }

    fn fixture(entities: InMemoryEntitySource, provider: MockMetadataProvider) -> Fixture {
        let cursors = Arc::new(InMemoryCursorStore::new());
        let cache = Arc::new(InMemoryMetadataCache::new());
        let provider = Arc::new(provider);
        let clock = Arc::new(FixedTimeProvider::new(1_000));
        let processor = WarmingProcessor::new(
            Arc::new(entities),
            cursors.clone(),
            cache.clone(),
            provider.clone(),
            Arc::new(RateGate::new(Duration::from_secs(1))),
            clock.clone(),
            WarmingConfig::default(),
        );
        Fixture {
            processor,
            cursors,
            cache,
            provider,
            clock,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_wraps_after_full_cycle() {
        let f = fixture(InMemoryEntitySource::numbered(30), MockMetadataProvider::new());

        let first = f.processor.run_once().await;
        assert_eq!((first.start_index, first.end_index), (0, 25));
        assert_eq!(first.processed, 25);
        assert_eq!(f.cursors.get(WARMING_CURSOR_NAME).unwrap().current_index, 25);

        let second = f.processor.run_once().await;
        assert_eq!((second.start_index, second.end_index), (25, 30));
        assert_eq!(f.cursors.get(WARMING_CURSOR_NAME).unwrap().current_index, 30);

        f.clock.set(9_000);
        let third = f.processor.run_once().await;
        assert!(third.cycle_reset);
        assert_eq!((third.start_index, third.end_index), (0, 25));
        assert_eq!(third.cycle_started_at, 9_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_both_keys_per_entity() {
        let f = fixture(
            InMemoryEntitySource::new(vec!["Ted Chiang".to_string()]),
            MockMetadataProvider::new(),
        );

        f.processor.run_once().await;
        let keys = f.cache.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"entity:ted chiang".to_string()));
        assert!(keys.contains(&query_hash_key(&SearchQuery::author("Ted Chiang"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_calls_spaced_by_rate_gate() {
        let f = fixture(InMemoryEntitySource::numbered(5), MockMetadataProvider::new());
        let start = tokio::time::Instant::now();

        f.processor.run_once().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert_eq!(f.provider.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_failure_is_skipped() {
        let f = fixture(
            InMemoryEntitySource::numbered(3),
            MockMetadataProvider::new().fail_for("Author 1"),
        );

        let report = f.processor.run_once().await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(f.cursors.get(WARMING_CURSOR_NAME).unwrap().current_index, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_degrade() {
        let f = fixture(InMemoryEntitySource::numbered(3), MockMetadataProvider::new());

        f.cache.set_fail_writes(true);
        let report = f.processor.run_once().await;
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed, 3);

        f.cursors.set_fail_loads(true);
        let report = f.processor.run_once().await;
        assert_eq!(report.processed, 0);
        assert!(report.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_list() {
        let f = fixture(InMemoryEntitySource::new(Vec::new()), MockMetadataProvider::new());
        let report = f.processor.run_once().await;
        assert_eq!(report.processed, 0);
        assert_eq!(report.total_count, 0);
    }
}
