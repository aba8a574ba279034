// Library Record Store Port

use crate::domain::{LibraryRecord, MetadataRecord, RecordRef};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_many(&self, records: &[LibraryRecord]) -> Result<()>;

    async fn get(&self, record_ref: &RecordRef) -> Result<Option<LibraryRecord>>;

    /// Attach provider metadata to an existing record
    async fn save_enrichment(
        &self,
        record_ref: &RecordRef,
        metadata: &MetadataRecord,
        enriched_at: i64,
    ) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryRecordStore {
        records: Mutex<HashMap<RecordRef, LibraryRecord>>,
    }

    impl InMemoryRecordStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl RecordStore for InMemoryRecordStore {
        async fn insert_many(&self, records: &[LibraryRecord]) -> Result<()> {
            let mut map = self.records.lock().unwrap();
            for record in records {
                let mut record = record.clone();
                // Upserts keep enrichment, as the SQLite store does
                if let Some(existing) = map.get(&record.record_ref) {
                    record.metadata = existing.metadata.clone();
                    record.enriched_at = existing.enriched_at;
                }
                map.insert(record.record_ref.clone(), record);
            }
            Ok(())
        }

        async fn get(&self, record_ref: &RecordRef) -> Result<Option<LibraryRecord>> {
            Ok(self.records.lock().unwrap().get(record_ref).cloned())
        }

        async fn save_enrichment(
            &self,
            record_ref: &RecordRef,
            metadata: &MetadataRecord,
            enriched_at: i64,
        ) -> Result<()> {
            let mut map = self.records.lock().unwrap();
            let record = map
                .get_mut(record_ref)
                .ok_or_else(|| AppError::NotFound(format!("record {}", record_ref)))?;
            record.metadata = Some(metadata.clone());
            record.enriched_at = Some(enriched_at);
            Ok(())
        }

        async fn count(&self) -> Result<i64> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }
}
