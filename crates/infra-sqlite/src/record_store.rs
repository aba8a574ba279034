// SQLite RecordStore Implementation

use crate::error::{from_json, map_sqlx_error};
use async_trait::async_trait;
use shelfwise_core::domain::{JobId, LibraryRecord, MetadataRecord, RecordRef};
use shelfwise_core::error::{AppError, Result};
use shelfwise_core::port::RecordStore;
use sqlx::SqlitePool;

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    record_ref: String,
    title: String,
    author: String,
    isbn: Option<String>,
    source_job: Option<String>,
    metadata: Option<String>,
    enriched_at: Option<i64>,
    created_at: i64,
}

impl RecordRow {
    fn into_record(self) -> Result<LibraryRecord> {
        Ok(LibraryRecord {
            record_ref: RecordRef::new(self.record_ref),
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            source_job: self.source_job.map(JobId::new),
            metadata: self
                .metadata
                .as_deref()
                .map(|raw| from_json::<MetadataRecord>("metadata", raw))
                .transpose()?,
            enriched_at: self.enriched_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_many(&self, records: &[LibraryRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for record in records {
            let metadata = record
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO records (
                    record_ref, title, author, isbn, source_job, metadata, enriched_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(record_ref) DO UPDATE SET
                    title = excluded.title,
                    author = excluded.author,
                    isbn = excluded.isbn,
                    source_job = excluded.source_job
                "#,
            )
            .bind(record.record_ref.as_str())
            .bind(&record.title)
            .bind(&record.author)
            .bind(&record.isbn)
            .bind(record.source_job.as_ref().map(|id| id.as_str()))
            .bind(metadata)
            .bind(record.enriched_at)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get(&self, record_ref: &RecordRef) -> Result<Option<LibraryRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT record_ref, title, author, isbn, source_job, metadata, enriched_at, created_at
            FROM records WHERE record_ref = ?
            "#,
        )
        .bind(record_ref.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn save_enrichment(
        &self,
        record_ref: &RecordRef,
        metadata: &MetadataRecord,
        enriched_at: i64,
    ) -> Result<()> {
        let outcome = sqlx::query("UPDATE records SET metadata = ?, enriched_at = ? WHERE record_ref = ?")
            .bind(serde_json::to_string(metadata)?)
            .bind(enriched_at)
            .bind(record_ref.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if outcome.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("record {}", record_ref)));
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use shelfwise_core::domain::BookCandidate;

    async fn setup() -> SqliteRecordStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteRecordStore::new(pool)
    }

    fn record(r: &str) -> LibraryRecord {
        let candidate = BookCandidate {
            title: "The Dispossessed".to_string(),
            author: "Ursula K. Le Guin".to_string(),
            isbn: None,
            confidence: Some(0.9),
        };
        LibraryRecord::from_candidate(RecordRef::new(r), &candidate, Some(JobId::new("job-1")), 1_000)
    }

    #[tokio::test]
    async fn test_insert_get_and_enrich() {
        let store = setup().await;
        store.insert_many(&[record("r1"), record("r2")]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let loaded = store.get(&RecordRef::new("r1")).await.unwrap().unwrap();
        assert_eq!(loaded, record("r1"));
        assert!(!loaded.is_enriched());

        let metadata = MetadataRecord {
            title: "The Dispossessed".to_string(),
            authors: vec!["Ursula K. Le Guin".to_string()],
            isbn: Some("9780061054884".to_string()),
            published_year: Some(1974),
            cover_url: None,
        };
        store
            .save_enrichment(&RecordRef::new("r1"), &metadata, 2_000)
            .await
            .unwrap();

        let enriched = store.get(&RecordRef::new("r1")).await.unwrap().unwrap();
        assert_eq!(enriched.metadata, Some(metadata));
        assert_eq!(enriched.enriched_at, Some(2_000));
    }

    #[tokio::test]
    async fn test_enrich_missing_record_is_not_found() {
        let store = setup().await;
        let metadata = MetadataRecord {
            title: "x".to_string(),
            authors: Vec::new(),
            isbn: None,
            published_year: None,
            cover_url: None,
        };
        let err = store
            .save_enrichment(&RecordRef::new("ghost"), &metadata, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
