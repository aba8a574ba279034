// SQLite Maintenance Implementation
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use shelfwise_core::application::constants::ENRICHMENT_QUEUE_NAMESPACE;
use shelfwise_core::error::{AppError, Result};
use shelfwise_core::port::{Maintenance, MaintenanceStats};
use sqlx::SqlitePool;
use tracing::info;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get DB file size in bytes
    async fn get_db_size(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        Ok(page_count * page_size)
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

fn to_mb(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        let size_before = to_mb(self.get_db_size().await?);

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("VACUUM failed: {}", e)))?;

        let size_after = to_mb(self.get_db_size().await?);
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn purge_expired_states(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM job_states WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected();
        info!(deleted_states = deleted, "Expired job state purge completed");
        Ok(deleted)
    }

    async fn purge_expired_cache(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metadata_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected();
        info!(deleted_cache_entries = deleted, "Expired cache purge completed");
        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes = self.get_db_size().await?;

        let queued_refs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_snapshots WHERE namespace = ?")
            .bind(ENRICHMENT_QUEUE_NAMESPACE)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(MaintenanceStats {
            db_size_mb: to_mb(db_size_bytes),
            db_size_bytes,
            job_state_count: self.count("SELECT COUNT(*) FROM job_states").await?,
            cache_entry_count: self.count("SELECT COUNT(*) FROM metadata_cache").await?,
            record_count: self.count("SELECT COUNT(*) FROM records").await?,
            queued_refs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteJobStateStore, SqliteMetadataCache};
    use shelfwise_core::domain::{DurableJobState, JobIdentifier, JobType, RetentionConfig};
    use shelfwise_core::port::{CacheEntry, JobStateStore, MaintenanceConfig, MetadataCache};

    #[tokio::test]
    async fn test_maintenance_stats() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let maintenance = SqliteMaintenance::new(pool);
        let stats = maintenance.get_stats().await.unwrap();

        assert!(stats.db_size_bytes > 0);
        assert_eq!(stats.job_state_count, 0);
        assert_eq!(stats.cache_entry_count, 0);
        assert_eq!(stats.queued_refs, 0);
    }

    #[tokio::test]
    async fn test_vacuum() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let maintenance = SqliteMaintenance::new(pool);
        let reclaimed = maintenance.vacuum().await.unwrap();
        assert!(reclaimed >= 0.0);
    }

    #[tokio::test]
    async fn test_full_maintenance_purges_expired_rows() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let retention = RetentionConfig::default();
        let states = SqliteJobStateStore::new(pool.clone());
        let cache = SqliteMetadataCache::new(pool.clone());
        let maintenance = SqliteMaintenance::new(pool);

        let state = DurableJobState::new(JobIdentifier::new("old", JobType::CsvImport, 0), 0, &retention);
        states.insert(&state).await.unwrap();
        cache
            .put_all(&[CacheEntry::new("entity:a", serde_json::json!([]))], 1_000, 0)
            .await
            .unwrap();

        let report = maintenance
            .run_full_maintenance(&MaintenanceConfig::default(), retention.max_age_ms)
            .await
            .unwrap();

        assert_eq!(report.purged_states, 1);
        assert_eq!(report.purged_cache_entries, 1);
        assert_eq!(report.stats.job_state_count, 0);
        assert_eq!(report.stats.cache_entry_count, 0);
    }
}
