// Job State Store Port (Interface)

use crate::domain::{DurableJobState, JobId, StatusKind};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence for per-job durable state
#[async_trait]
pub trait JobStateStore: Send + Sync {
    /// Create the state of a new job.
    ///
    /// Fails with `AppError::Conflict` if an unexpired state already exists
    /// for the same id. An expired leftover is replaced.
    async fn insert(&self, state: &DurableJobState) -> Result<()>;

    /// Overwrite an existing state
    async fn save(&self, state: &DurableJobState) -> Result<()>;

    /// Find a state by id. Expired states read as absent.
    async fn find(&self, job_id: &JobId, now: i64) -> Result<Option<DurableJobState>>;

    /// All non-terminal states (for crash recovery)
    async fn find_unfinished(&self) -> Result<Vec<DurableJobState>>;

    /// Delete expired states, returning how many were removed
    async fn purge_expired(&self, now: i64) -> Result<u64>;

    /// Count live states by status
    async fn count_by_status(&self, now: i64) -> Result<Vec<(StatusKind, i64)>>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// HashMap-backed store for unit tests
    #[derive(Default)]
    pub struct InMemoryJobStateStore {
        states: Mutex<HashMap<JobId, DurableJobState>>,
    }

    impl InMemoryJobStateStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Raw read, ignoring expiry
        pub fn get_raw(&self, job_id: &JobId) -> Option<DurableJobState> {
            self.states.lock().unwrap().get(job_id).cloned()
        }
    }

    #[async_trait]
    impl JobStateStore for InMemoryJobStateStore {
        async fn insert(&self, state: &DurableJobState) -> Result<()> {
            let mut states = self.states.lock().unwrap();
            let job_id = &state.identifier.job_id;
            if let Some(existing) = states.get(job_id) {
                if !existing.is_expired(state.updated_at) {
                    return Err(AppError::Conflict(format!("job {} already exists", job_id)));
                }
            }
            states.insert(job_id.clone(), state.clone());
            Ok(())
        }

        async fn save(&self, state: &DurableJobState) -> Result<()> {
            let mut states = self.states.lock().unwrap();
            let job_id = &state.identifier.job_id;
            if !states.contains_key(job_id) {
                return Err(AppError::NotFound(format!("job {}", job_id)));
            }
            states.insert(job_id.clone(), state.clone());
            Ok(())
        }

        async fn find(&self, job_id: &JobId, now: i64) -> Result<Option<DurableJobState>> {
            let states = self.states.lock().unwrap();
            Ok(states.get(job_id).filter(|s| !s.is_expired(now)).cloned())
        }

        async fn find_unfinished(&self) -> Result<Vec<DurableJobState>> {
            let states = self.states.lock().unwrap();
            Ok(states
                .values()
                .filter(|s| !s.status.is_terminal())
                .cloned()
                .collect())
        }

        async fn purge_expired(&self, now: i64) -> Result<u64> {
            let mut states = self.states.lock().unwrap();
            let before = states.len();
            states.retain(|_, s| !s.is_expired(now));
            Ok((before - states.len()) as u64)
        }

        async fn count_by_status(&self, now: i64) -> Result<Vec<(StatusKind, i64)>> {
            let states = self.states.lock().unwrap();
            Ok(StatusKind::ALL
                .iter()
                .map(|kind| {
                    let n = states
                        .values()
                        .filter(|s| !s.is_expired(now) && s.status.kind() == *kind)
                        .count();
                    (*kind, n as i64)
                })
                .collect())
        }
    }
}
