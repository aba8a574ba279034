// SQLite EntitySource Implementation (warming entity list)

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use shelfwise_core::error::Result;
use shelfwise_core::port::EntitySource;
use sqlx::SqlitePool;

pub struct SqliteEntitySource {
    pool: SqlitePool,
}

impl SqliteEntitySource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitySource for SqliteEntitySource {
    async fn load_entities(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM warming_entities ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn replace_entities(&self, names: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM warming_entities")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for (position, name) in names.iter().enumerate() {
            sqlx::query("INSERT INTO warming_entities (position, name) VALUES (?, ?)")
                .bind(position as i64)
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(names.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    #[tokio::test]
    async fn test_replace_keeps_order() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let source = SqliteEntitySource::new(pool);

        let first = vec!["Ursula K. Le Guin".to_string(), "Iain M. Banks".to_string()];
        assert_eq!(source.replace_entities(&first).await.unwrap(), 2);

        let second = vec!["Octavia E. Butler".to_string()];
        source.replace_entities(&second).await.unwrap();

        assert_eq!(source.load_entities().await.unwrap(), second);
    }
}
