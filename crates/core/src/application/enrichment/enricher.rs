// Library enricher: resolves a record and attaches provider metadata

use crate::domain::{RecordRef, SearchQuery};
use crate::error::{AppError, Result};
use crate::port::{EnrichmentProvider, MetadataProvider, RecordStore, TimeProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct LibraryEnricher {
    records: Arc<dyn RecordStore>,
    provider: Arc<dyn MetadataProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl LibraryEnricher {
    pub fn new(
        records: Arc<dyn RecordStore>,
        provider: Arc<dyn MetadataProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            records,
            provider,
            time_provider,
        }
    }
}

#[async_trait]
impl EnrichmentProvider for LibraryEnricher {
    async fn enrich(&self, record_ref: &RecordRef) -> Result<()> {
        let record = self
            .records
            .get(record_ref)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("record {}", record_ref)))?;

        if record.is_enriched() {
            debug!(record_ref = %record_ref, "Record already enriched, skipping");
            return Ok(());
        }

        let query = SearchQuery::title_author(&record.title, &record.author);
        let best = self
            .provider
            .search(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("no metadata for \"{}\"", record.title)))?;

        self.records
            .save_enrichment(record_ref, &best, self.time_provider.now_millis())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BookCandidate, LibraryRecord};
    use crate::port::metadata_provider::mocks::MockMetadataProvider;
    use crate::port::record_store::mocks::InMemoryRecordStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    async fn store_with(title: &str) -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        let candidate = BookCandidate {
            title: title.to_string(),
            author: "Ursula K. Le Guin".to_string(),
            isbn: None,
            confidence: Some(0.9),
        };
        store
            .insert_many(&[LibraryRecord::from_candidate(
                RecordRef::from("r1"),
                &candidate,
                None,
                0,
            )])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_enrich_attaches_metadata() {
        let store = store_with("The Dispossessed").await;
        let provider = Arc::new(MockMetadataProvider::new());
        let enricher = LibraryEnricher::new(
            store.clone(),
            provider.clone(),
            Arc::new(FixedTimeProvider::new(77)),
        );

        enricher.enrich(&RecordRef::from("r1")).await.unwrap();

        let record = store.get(&RecordRef::from("r1")).await.unwrap().unwrap();
        assert_eq!(record.enriched_at, Some(77));
        assert_eq!(
            provider.calls()[0].params.get("author").map(String::as_str),
            Some("Ursula K. Le Guin")
        );

        // Second pass is a no-op
        enricher.enrich(&RecordRef::from("r1")).await.unwrap();
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_and_provider_failure() {
        let store = store_with("Lathe of Heaven").await;
        let provider = Arc::new(MockMetadataProvider::new().fail_for("Lathe of Heaven"));
        let enricher =
            LibraryEnricher::new(store, provider, Arc::new(FixedTimeProvider::new(0)));

        assert!(matches!(
            enricher.enrich(&RecordRef::from("nope")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            enricher.enrich(&RecordRef::from("r1")).await,
            Err(AppError::Provider(_))
        ));
    }
}
