// SQLite JobStateStore Implementation

use crate::error::{from_json, map_sqlx_error};
use async_trait::async_trait;
use shelfwise_core::domain::{
    DurableJobState, JobFailure, JobId, JobIdentifier, JobProgress, JobStatus, JobType, StatusKind,
};
use shelfwise_core::error::{AppError, Result};
use shelfwise_core::port::JobStateStore;
use sqlx::SqlitePool;
use std::str::FromStr;

pub struct SqliteJobStateStore {
    pool: SqlitePool,
}

impl SqliteJobStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobStateRow {
    job_id: String,
    job_type: String,
    created_at: i64,
    status: String,
    progress: Option<String>,
    result: Option<String>,
    error: Option<String>,
    heartbeat_at: i64,
    updated_at: i64,
    expires_at: i64,
}

impl JobStateRow {
    fn into_state(self) -> Result<DurableJobState> {
        let last_progress: Option<JobProgress> = self
            .progress
            .as_deref()
            .map(|raw| from_json("progress", raw))
            .transpose()?;

        let status = match StatusKind::from_str(&self.status)? {
            StatusKind::Queued => JobStatus::Queued,
            StatusKind::Active => JobStatus::Active(last_progress.clone().ok_or_else(|| {
                AppError::Database(format!("Active job {} has no progress", self.job_id))
            })?),
            StatusKind::Completed => JobStatus::Completed(match self.result.as_deref() {
                Some(raw) => from_json("result", raw)?,
                None => serde_json::Value::Null,
            }),
            StatusKind::Failed => JobStatus::Failed(match self.error.as_deref() {
                Some(raw) => from_json::<JobFailure>("error", raw)?,
                None => JobFailure::new("unknown failure"),
            }),
            StatusKind::Cancelled => JobStatus::Cancelled,
        };

        Ok(DurableJobState {
            identifier: JobIdentifier::new(
                JobId::new(self.job_id),
                JobType::from_str(&self.job_type)?,
                self.created_at,
            ),
            status,
            last_progress,
            heartbeat_at: self.heartbeat_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        })
    }
}

/// Serialized optional columns of a state: (progress, result, error)
fn encode_columns(state: &DurableJobState) -> Result<(Option<String>, Option<String>, Option<String>)> {
    let progress = state
        .last_progress
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let result = match &state.status {
        JobStatus::Completed(value) => Some(serde_json::to_string(value)?),
        _ => None,
    };
    let error = match &state.status {
        JobStatus::Failed(failure) => Some(serde_json::to_string(failure)?),
        _ => None,
    };
    Ok((progress, result, error))
}

const SELECT_COLUMNS: &str = "SELECT job_id, job_type, created_at, status, progress, result, error, \
     heartbeat_at, updated_at, expires_at FROM job_states";

#[async_trait]
impl JobStateStore for SqliteJobStateStore {
    async fn insert(&self, state: &DurableJobState) -> Result<()> {
        let (progress, result, error) = encode_columns(state)?;

        // An expired leftover row is overwritten; a live one is a conflict
        let outcome = sqlx::query(
            r#"
            INSERT INTO job_states (
                job_id, job_type, created_at, status, progress, result, error,
                heartbeat_at, updated_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                job_type = excluded.job_type,
                created_at = excluded.created_at,
                status = excluded.status,
                progress = excluded.progress,
                result = excluded.result,
                error = excluded.error,
                heartbeat_at = excluded.heartbeat_at,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
            WHERE job_states.expires_at <= ?
            "#,
        )
        .bind(state.identifier.job_id.as_str())
        .bind(state.identifier.job_type.to_string())
        .bind(state.identifier.created_at)
        .bind(state.status.kind().to_string())
        .bind(progress)
        .bind(result)
        .bind(error)
        .bind(state.heartbeat_at)
        .bind(state.updated_at)
        .bind(state.expires_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if outcome.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Job {} already exists",
                state.identifier.job_id
            )));
        }
        Ok(())
    }

    async fn save(&self, state: &DurableJobState) -> Result<()> {
        let (progress, result, error) = encode_columns(state)?;

        let outcome = sqlx::query(
            r#"
            UPDATE job_states
            SET status = ?, progress = ?, result = ?, error = ?,
                heartbeat_at = ?, updated_at = ?, expires_at = ?
            WHERE job_id = ?
            "#,
        )
        .bind(state.status.kind().to_string())
        .bind(progress)
        .bind(result)
        .bind(error)
        .bind(state.heartbeat_at)
        .bind(state.updated_at)
        .bind(state.expires_at)
        .bind(state.identifier.job_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if outcome.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Job {} not found",
                state.identifier.job_id
            )));
        }
        Ok(())
    }

    async fn find(&self, job_id: &JobId, now: i64) -> Result<Option<DurableJobState>> {
        let row: Option<JobStateRow> =
            sqlx::query_as(&format!("{} WHERE job_id = ? AND expires_at > ?", SELECT_COLUMNS))
                .bind(job_id.as_str())
                .bind(now)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.map(JobStateRow::into_state).transpose()
    }

    async fn find_unfinished(&self) -> Result<Vec<DurableJobState>> {
        let rows: Vec<JobStateRow> = sqlx::query_as(&format!(
            "{} WHERE status IN (?, ?) ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(StatusKind::Queued.to_string())
        .bind(StatusKind::Active.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobStateRow::into_state).collect()
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let outcome = sqlx::query("DELETE FROM job_states WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(outcome.rows_affected())
    }

    async fn count_by_status(&self, now: i64) -> Result<Vec<(StatusKind, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM job_states WHERE expires_at > ? GROUP BY status",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut counts = Vec::with_capacity(StatusKind::ALL.len());
        for kind in StatusKind::ALL {
            let count = rows
                .iter()
                .find(|(status, _)| status == &kind.to_string())
                .map(|(_, count)| *count)
                .unwrap_or(0);
            counts.push((kind, count));
        }
        Ok(counts)
    }
}
