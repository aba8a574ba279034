// Crash recovery for job states orphaned by a daemon restart
use crate::application::constants::{DEFAULT_MAX_DURATION, RESTART_INTERRUPTED_MESSAGE};
use crate::domain::{JobStatus, RetentionConfig};
use crate::port::{JobStateStore, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// On startup, fails non-terminal job states whose invocation cannot still
/// be running.
///
/// No invocation survives a restart, so any `Queued`/`Active` state not
/// written within the invocation budget is an orphan. Younger states are left
/// to the read-side staleness check.
pub struct RecoveryService {
    store: Arc<dyn JobStateStore>,
    time_provider: Arc<dyn TimeProvider>,
    retention: RetentionConfig,
    recovery_window_ms: i64,
}

impl RecoveryService {
    /// `recovery_window_ms` defaults to the invocation budget (5 minutes)
    pub fn new(
        store: Arc<dyn JobStateStore>,
        time_provider: Arc<dyn TimeProvider>,
        retention: RetentionConfig,
        recovery_window_ms: Option<i64>,
    ) -> Self {
        Self {
            store,
            time_provider,
            retention,
            recovery_window_ms: recovery_window_ms
                .unwrap_or(DEFAULT_MAX_DURATION.as_millis() as i64),
        }
    }

    /// Returns the number of states marked failed
    pub async fn recover_orphaned_jobs(&self) -> crate::error::Result<usize> {
        let now = self.time_provider.now_millis();
        let cutoff = now - self.recovery_window_ms;

        info!(
            cutoff_time = %cutoff,
            recovery_window_ms = %self.recovery_window_ms,
            "Starting orphaned job recovery"
        );

        let unfinished = self.store.find_unfinished().await?;
        let mut recovered_count = 0;

        for mut state in unfinished {
            if state.heartbeat_at >= cutoff {
                continue;
            }

            let failure = state.lost_failure(RESTART_INTERRUPTED_MESSAGE);
            if let Err(e) = state.apply(JobStatus::Failed(failure), now, &self.retention) {
                warn!(job_id = %state.identifier.job_id, error = %e, "Cannot recover job state");
                continue;
            }
            self.store.save(&state).await?;

            info!(
                job_id = %state.identifier.job_id,
                job_type = %state.identifier.job_type,
                "Orphaned job marked as failed"
            );
            recovered_count += 1;
        }

        info!(recovered_count = %recovered_count, "Orphaned job recovery complete");
        Ok(recovered_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DurableJobState, JobId, JobIdentifier, JobProgress, JobType};
    use crate::port::job_state_store::mocks::InMemoryJobStateStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    async fn seed(store: &InMemoryJobStateStore, id: &str, at: i64, status: JobStatus) {
        let retention = RetentionConfig::default();
        let mut state =
            DurableJobState::new(JobIdentifier::new(id, JobType::CsvImport, at), at, &retention);
        if status != JobStatus::Queued {
            state.apply(status, at, &retention).unwrap();
        }
        store.insert(&state).await.unwrap();
    }

    #[tokio::test]
    async fn test_recovers_only_old_unfinished_states() {
        let store = Arc::new(InMemoryJobStateStore::new());
        let active = JobStatus::Active(JobProgress::new(10, 4, "x").unwrap());
        seed(&store, "old-active", 0, active.clone()).await;
        seed(&store, "old-queued", 0, JobStatus::Queued).await;
        seed(&store, "old-done", 0, JobStatus::Completed(serde_json::Value::Null)).await;
        seed(&store, "recent", 550_000, active).await;

        let recovery = RecoveryService::new(
            store.clone(),
            Arc::new(FixedTimeProvider::new(600_000)),
            RetentionConfig::default(),
            None,
        );
        assert_eq!(recovery.recover_orphaned_jobs().await.unwrap(), 2);

        match store.get_raw(&JobId::new("old-active")).unwrap().status {
            JobStatus::Failed(failure) => {
                assert_eq!(failure.message, RESTART_INTERRUPTED_MESSAGE);
                assert_eq!(failure.processed_items, Some(4));
            }
            other => panic!("expected failed, got {:?}", other),
        }
        assert!(matches!(
            store.get_raw(&JobId::new("recent")).unwrap().status,
            JobStatus::Active(_)
        ));
    }
}
