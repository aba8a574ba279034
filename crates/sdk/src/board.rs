//! Status board: the coordinator's job table.
//!
//! Only the coordinator writes (`pub(crate)` setters); everyone else reads
//! a snapshot with `get` or follows `subscribe`.

use shelfwise_core::domain::{JobId, JobIdentifier, JobStatus};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::warn;

const CHANGE_BUFFER: usize = 256;

/// Snapshot of one tracked job
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    pub identifier: JobIdentifier,
    pub status: JobStatus,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub job_id: JobId,
    pub status: JobStatus,
}

pub struct StatusBoard {
    jobs: RwLock<HashMap<JobId, TrackedJob>>,
    changes: broadcast::Sender<StatusChange>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            jobs: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn get(&self, job_id: &JobId) -> Option<TrackedJob> {
        self.read().get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Change notifications from now on; lagging receivers lose the oldest
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    /// Start tracking a job as `Queued`
    pub(crate) fn insert(&self, identifier: &JobIdentifier, now: i64) {
        self.write().insert(
            identifier.job_id.clone(),
            TrackedJob {
                identifier: identifier.clone(),
                status: JobStatus::Queued,
                updated_at: now,
            },
        );
        self.notify(&identifier.job_id, JobStatus::Queued);
    }

    /// Apply a transition. Returns false when the job is unknown, already
    /// terminal, or the move is illegal.
    pub(crate) fn set(&self, job_id: &JobId, status: JobStatus, now: i64) -> bool {
        {
            let mut jobs = self.write();
            let Some(job) = jobs.get_mut(job_id) else {
                return false;
            };
            if job.status.is_terminal() {
                return false;
            }
            if job.status == status {
                return true;
            }
            if let Err(e) = job.status.transition_to(&status) {
                warn!(job_id = %job_id, error = %e, "Rejected status change");
                return false;
            }
            job.status = status.clone();
            job.updated_at = now;
        }
        self.notify(job_id, status);
        true
    }

    fn notify(&self, job_id: &JobId, status: JobStatus) {
        // No subscribers is fine
        let _ = self.changes.send(StatusChange {
            job_id: job_id.clone(),
            status,
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, TrackedJob>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, TrackedJob>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
