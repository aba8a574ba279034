// SQLite MetadataCache Implementation

use crate::error::{from_json, map_sqlx_error};
use async_trait::async_trait;
use shelfwise_core::error::Result;
use shelfwise_core::port::{CacheEntry, MetadataCache};
use sqlx::SqlitePool;

pub struct SqliteMetadataCache {
    pool: SqlitePool,
}

impl SqliteMetadataCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataCache for SqliteMetadataCache {
    async fn get(&self, key: &str, now: i64) -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT value FROM metadata_cache WHERE cache_key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        raw.as_deref().map(|raw| from_json("value", raw)).transpose()
    }

    async fn put_all(&self, entries: &[CacheEntry], ttl_ms: i64, now: i64) -> Result<()> {
        let expires_at = now + ttl_ms;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO metadata_cache (cache_key, value, expires_at) VALUES (?, ?, ?)
                ON CONFLICT(cache_key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(&entry.key)
            .bind(serde_json::to_string(&entry.value)?)
            .bind(expires_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let outcome = sqlx::query("DELETE FROM metadata_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(outcome.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use serde_json::json;

    async fn setup() -> SqliteMetadataCache {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteMetadataCache::new(pool)
    }

    #[tokio::test]
    async fn test_put_all_writes_every_key() {
        let cache = setup().await;
        let value = json!([{"title": "Dune", "authors": ["Frank Herbert"]}]);
        cache
            .put_all(
                &[
                    CacheEntry::new("entity:frank herbert", value.clone()),
                    CacheEntry::new("query-hash:abc:def", value.clone()),
                ],
                1_000,
                0,
            )
            .await
            .unwrap();

        assert_eq!(cache.get("entity:frank herbert", 10).await.unwrap(), Some(value.clone()));
        assert_eq!(cache.get("query-hash:abc:def", 10).await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_expired_entries_read_absent_and_purge() {
        let cache = setup().await;
        cache
            .put_all(&[CacheEntry::new("k", json!(1))], 1_000, 0)
            .await
            .unwrap();

        assert!(cache.get("k", 999).await.unwrap().is_some());
        assert!(cache.get("k", 1_000).await.unwrap().is_none());
        assert_eq!(cache.purge_expired(1_000).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rewrite_extends_ttl() {
        let cache = setup().await;
        cache.put_all(&[CacheEntry::new("k", json!(1))], 100, 0).await.unwrap();
        cache.put_all(&[CacheEntry::new("k", json!(2))], 100, 90).await.unwrap();

        assert_eq!(cache.get("k", 150).await.unwrap(), Some(json!(2)));
    }
}
