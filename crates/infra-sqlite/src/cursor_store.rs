// SQLite CursorStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use shelfwise_core::domain::BatchCursor;
use shelfwise_core::error::Result;
use shelfwise_core::port::CursorStore;
use sqlx::SqlitePool;

pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn load(&self, name: &str) -> Result<Option<BatchCursor>> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            "SELECT current_index, total_count, started_at FROM batch_cursors WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(current_index, total_count, started_at)| BatchCursor {
            current_index: current_index.max(0) as u64,
            total_count: total_count.max(0) as u64,
            started_at,
        }))
    }

    async fn save(&self, name: &str, cursor: &BatchCursor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_cursors (name, current_index, total_count, started_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                current_index = excluded.current_index,
                total_count = excluded.total_count,
                started_at = excluded.started_at
            "#,
        )
        .bind(name)
        .bind(cursor.current_index as i64)
        .bind(cursor.total_count as i64)
        .bind(cursor.started_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
