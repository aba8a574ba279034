// Per-Job Durable State

use crate::domain::error::Result;
use crate::domain::job::{JobFailure, JobIdentifier, JobProgress, JobStatus};
use crate::domain::message::{JobStatusResponse, ProgressMessage};
use std::time::Duration;

/// Retention bounds of a durable job state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Kept this long after reaching a terminal state
    pub terminal_grace_ms: i64,
    /// Hard upper bound counted from creation
    pub max_age_ms: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            terminal_grace_ms: 10 * 60 * 1000,
            max_age_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl RetentionConfig {
    pub fn new(terminal_grace: Duration, max_age: Duration) -> Self {
        Self {
            terminal_grace_ms: terminal_grace.as_millis() as i64,
            max_age_ms: max_age.as_millis() as i64,
        }
    }
}

/// Server-held mirror of one job's latest status
#[derive(Debug, Clone, PartialEq)]
pub struct DurableJobState {
    pub identifier: JobIdentifier,
    pub status: JobStatus,
    /// Last business progress seen, kept after the job turns terminal
    pub last_progress: Option<JobProgress>,
    pub heartbeat_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
}

impl DurableJobState {
    pub fn new(identifier: JobIdentifier, now: i64, retention: &RetentionConfig) -> Self {
        Self {
            identifier,
            status: JobStatus::Queued,
            last_progress: None,
            heartbeat_at: now,
            updated_at: now,
            expires_at: now + retention.max_age_ms,
        }
    }

    /// Apply a status change, enforcing the job state machine
    pub fn apply(&mut self, next: JobStatus, now: i64, retention: &RetentionConfig) -> Result<()> {
        self.status.transition_to(&next)?;

        if let JobStatus::Active(progress) = &next {
            self.last_progress = Some(progress.clone());
        }
        if next.is_terminal() {
            self.expires_at = self.expires_at.min(now + retention.terminal_grace_ms);
        }

        self.status = next;
        self.updated_at = now;
        self.heartbeat_at = now;
        Ok(())
    }

    pub fn record_heartbeat(&mut self, now: i64) {
        self.heartbeat_at = now;
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// True when a non-terminal job has not been written or heartbeated for
    /// `stale_after_ms`, meaning no invocation is serving it anymore.
    pub fn is_stale(&self, now: i64, stale_after_ms: i64) -> bool {
        !self.status.is_terminal() && now - self.heartbeat_at > stale_after_ms
    }

    /// Failure recorded when the serving invocation is gone
    pub fn lost_failure(&self, message: &str) -> JobFailure {
        JobFailure::new(message).with_progress(self.last_progress.as_ref())
    }

    pub fn to_message(&self) -> Option<ProgressMessage> {
        ProgressMessage::from_status(&self.identifier.job_id, &self.status)
    }

    pub fn to_response(&self) -> JobStatusResponse {
        JobStatusResponse::new(&self.identifier, &self.status, self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::JobType;
    use crate::domain::DomainError;

    fn state(now: i64) -> DurableJobState {
        DurableJobState::new(
            JobIdentifier::new("j1", JobType::BookshelfScan, now),
            now,
            &RetentionConfig::default(),
        )
    }

    #[test]
    fn test_expires_after_max_age_when_never_terminal() {
        let s = state(0);
        assert!(!s.is_expired(24 * 60 * 60 * 1000 - 1));
        assert!(s.is_expired(24 * 60 * 60 * 1000));
    }

    #[test]
    fn test_terminal_grace_shortens_expiry() {
        let retention = RetentionConfig::default();
        let mut s = state(0);
        s.apply(JobStatus::Completed(serde_json::json!({})), 5_000, &retention)
            .unwrap();
        assert_eq!(s.expires_at, 5_000 + 10 * 60 * 1000);
    }

    #[test]
    fn test_terminal_grace_never_extends_past_max_age() {
        let retention = RetentionConfig::new(Duration::from_secs(600), Duration::from_secs(60));
        let mut s = DurableJobState::new(
            JobIdentifier::new("j1", JobType::CsvImport, 0),
            0,
            &retention,
        );
        s.apply(JobStatus::Cancelled, 30_000, &retention).unwrap();
        assert_eq!(s.expires_at, 60_000);
    }

    #[test]
    fn test_terminal_state_is_frozen() {
        let retention = RetentionConfig::default();
        let mut s = state(0);
        s.apply(JobStatus::Failed(JobFailure::new("x")), 1, &retention)
            .unwrap();
        let err = s
            .apply(JobStatus::Completed(serde_json::Value::Null), 2, &retention)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert!(matches!(s.status, JobStatus::Failed(_)));
    }

    #[test]
    fn test_staleness_uses_heartbeat() {
        let retention = RetentionConfig::default();
        let mut s = state(0);
        s.apply(
            JobStatus::Active(JobProgress::new(3, 1, "x").unwrap()),
            1_000,
            &retention,
        )
        .unwrap();
        assert!(s.is_stale(62_000, 60_000));

        s.record_heartbeat(30_000);
        assert!(!s.is_stale(62_000, 60_000));

        let lost = s.lost_failure("job invocation lost");
        assert_eq!(lost.processed_items, Some(1));
        assert_eq!(lost.total_items, Some(3));
    }
}
