// SQLite QueuePersistence Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use shelfwise_core::domain::{QueueItem, RecordRef};
use shelfwise_core::error::Result;
use shelfwise_core::port::QueuePersistence;
use sqlx::SqlitePool;

pub struct SqliteQueuePersistence {
    pool: SqlitePool,
}

impl SqliteQueuePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueuePersistence for SqliteQueuePersistence {
    async fn load(&self, namespace: &str) -> Result<Vec<QueueItem>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT record_ref, enqueued_at FROM queue_snapshots WHERE namespace = ? ORDER BY position ASC",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(record_ref, enqueued_at)| QueueItem::new(RecordRef::new(record_ref), enqueued_at))
            .collect())
    }

    async fn save(&self, namespace: &str, items: &[QueueItem]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM queue_snapshots WHERE namespace = ?")
            .bind(namespace)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO queue_snapshots (namespace, position, record_ref, enqueued_at) VALUES (?, ?, ?, ?)",
            )
            .bind(namespace)
            .bind(position as i64)
            .bind(item.record_ref.as_str())
            .bind(item.enqueued_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    fn item(r: &str, at: i64) -> QueueItem {
        QueueItem::new(RecordRef::new(r), at)
    }

    #[tokio::test]
    async fn test_save_replaces_snapshot_in_order() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let persistence = SqliteQueuePersistence::new(pool);

        assert!(persistence.load("q").await.unwrap().is_empty());

        persistence
            .save("q", &[item("r1", 1), item("r2", 2), item("r3", 3)])
            .await
            .unwrap();
        persistence
            .save("q", &[item("r3", 3), item("r1", 1)])
            .await
            .unwrap();

        let loaded = persistence.load("q").await.unwrap();
        assert_eq!(loaded, vec![item("r3", 3), item("r1", 1)]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let persistence = SqliteQueuePersistence::new(pool);

        persistence.save("a", &[item("r1", 1)]).await.unwrap();
        persistence.save("b", &[]).await.unwrap();

        assert_eq!(persistence.load("a").await.unwrap().len(), 1);
        assert!(persistence.load("b").await.unwrap().is_empty());
    }
}
