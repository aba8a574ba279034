// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::port::{IdProvider, TimeProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (UUID v4, chosen by the client at submission time)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// AI analysis of a bookshelf photo
    BookshelfScan,
    /// AI-assisted parsing of a CSV library export
    CsvImport,
    /// Background enrichment of imported records
    Enrichment,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::BookshelfScan => write!(f, "bookshelf-scan"),
            JobType::CsvImport => write!(f, "csv-import"),
            JobType::Enrichment => write!(f, "enrichment"),
        }
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bookshelf-scan" => Ok(JobType::BookshelfScan),
            "csv-import" => Ok(JobType::CsvImport),
            "enrichment" => Ok(JobType::Enrichment),
            other => Err(DomainError::ValidationError(format!(
                "Unknown job type: {}",
                other
            ))),
        }
    }
}

/// Job Identifier: the join key across every component.
///
/// Immutable once created. The client creates it before submitting so it can
/// start listening before the server has written any state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobIdentifier {
    pub job_id: JobId,
    pub job_type: JobType,
    pub created_at: i64, // epoch ms
}

impl JobIdentifier {
    pub fn new(job_id: impl Into<JobId>, job_type: JobType, created_at: i64) -> Self {
        Self {
            job_id: job_id.into(),
            job_type,
            created_at,
        }
    }

    /// Create an identifier with injected ID and time providers
    pub fn generate(
        job_type: JobType,
        id_provider: &dyn IdProvider,
        time_provider: &dyn TimeProvider,
    ) -> Self {
        Self::new(
            id_provider.generate_id(),
            job_type,
            time_provider.now_millis(),
        )
    }
}

/// Job Progress
///
/// `processed_items` is always within `[0, total_items]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total_items: u32,
    pub processed_items: u32,
    pub current_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>, // seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,
}

impl JobProgress {
    pub fn new(
        total_items: u32,
        processed_items: u32,
        current_status: impl Into<String>,
    ) -> Result<Self> {
        let progress = Self {
            total_items,
            processed_items,
            current_status: current_status.into(),
            estimated_time_remaining: None,
            keep_alive: None,
        };
        progress.validate()?;
        Ok(progress)
    }

    /// Build progress from signed counts (wire input), rejecting negatives
    pub fn from_counts(total: i64, processed: i64, current_status: impl Into<String>) -> Result<Self> {
        let total_items = to_count("total", total)?;
        let processed_items = to_count("processed", processed)?;
        Self::new(total_items, processed_items, current_status)
    }

    /// Zero-item progress used when a job becomes active
    pub fn starting(current_status: impl Into<String>) -> Self {
        Self {
            total_items: 0,
            processed_items: 0,
            current_status: current_status.into(),
            estimated_time_remaining: None,
            keep_alive: None,
        }
    }

    pub fn with_eta(mut self, seconds: Option<u64>) -> Self {
        self.estimated_time_remaining = seconds;
        self
    }

    /// Fraction of work done, defined as 0 when there are no items
    pub fn fraction_completed(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            self.processed_items as f64 / self.total_items as f64
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.processed_items > self.total_items {
            return Err(DomainError::ProgressOutOfRange {
                processed: self.processed_items,
                total: self.total_items,
            });
        }
        Ok(())
    }

    /// Check that `next` is a legal successor of `self` within one job
    pub fn advance_to(&self, next: &JobProgress) -> Result<()> {
        next.validate()?;
        if next.processed_items < self.processed_items {
            return Err(DomainError::ProgressRegressed {
                previous: self.processed_items,
                next: next.processed_items,
            });
        }
        Ok(())
    }
}

fn to_count(field: &'static str, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(DomainError::NegativeCount { field, value });
    }
    u32::try_from(value).map_err(|_| DomainError::ValidationError(format!("{} count too large: {}", field, value)))
}

/// Failure payload: human-readable message plus the counts reached, if known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u32>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            processed_items: None,
            total_items: None,
        }
    }

    /// Attach the partial counts of the last known progress
    pub fn with_progress(mut self, progress: Option<&JobProgress>) -> Self {
        if let Some(p) = progress {
            self.processed_items = Some(p.processed_items);
            self.total_items = Some(p.total_items);
        }
        self
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Job Status
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Active(JobProgress),
    Completed(serde_json::Value),
    Failed(JobFailure),
    Cancelled,
}

impl JobStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            JobStatus::Queued => StatusKind::Queued,
            JobStatus::Active(_) => StatusKind::Active,
            JobStatus::Completed(_) => StatusKind::Completed,
            JobStatus::Failed(_) => StatusKind::Failed,
            JobStatus::Cancelled => StatusKind::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    pub fn progress(&self) -> Option<&JobProgress> {
        match self {
            JobStatus::Active(p) => Some(p),
            _ => None,
        }
    }

    /// Validate a transition: `Queued -> Active* -> terminal`, never backwards
    pub fn transition_to(&self, next: &JobStatus) -> Result<()> {
        let invalid = || DomainError::InvalidStateTransition {
            from: self.kind().to_string(),
            to: next.kind().to_string(),
        };

        match (self, next) {
            (current, _) if current.is_terminal() => Err(invalid()),
            (_, JobStatus::Queued) => Err(invalid()),
            (JobStatus::Active(previous), JobStatus::Active(progress)) => {
                previous.advance_to(progress)
            }
            (_, JobStatus::Active(progress)) => progress.validate(),
            _ => Ok(()),
        }
    }
}

/// Status discriminant (wire and storage representation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Queued,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl StatusKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusKind::Completed | StatusKind::Failed | StatusKind::Cancelled
        )
    }

    pub const ALL: [StatusKind; 5] = [
        StatusKind::Queued,
        StatusKind::Active,
        StatusKind::Completed,
        StatusKind::Failed,
        StatusKind::Cancelled,
    ];
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Queued => write!(f, "queued"),
            StatusKind::Active => write!(f, "active"),
            StatusKind::Completed => write!(f, "completed"),
            StatusKind::Failed => write!(f, "failed"),
            StatusKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for StatusKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(StatusKind::Queued),
            "active" => Ok(StatusKind::Active),
            "completed" => Ok(StatusKind::Completed),
            "failed" => Ok(StatusKind::Failed),
            "cancelled" => Ok(StatusKind::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "Unknown status: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    fn progress(total: u32, processed: u32) -> JobProgress {
        JobProgress::new(total, processed, "working").unwrap()
    }

    #[test]
    fn test_fraction_completed_zero_total() {
        let p = JobProgress::starting("queued");
        assert_eq!(p.fraction_completed(), 0.0);
    }

    #[test]
    fn test_fraction_completed() {
        assert_eq!(progress(4, 1).fraction_completed(), 0.25);
        assert_eq!(progress(13, 13).fraction_completed(), 1.0);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let err = JobProgress::from_counts(-1, 0, "x").unwrap_err();
        assert!(matches!(err, DomainError::NegativeCount { field: "total", .. }));

        let err = JobProgress::from_counts(5, -2, "x").unwrap_err();
        assert!(matches!(err, DomainError::NegativeCount { field: "processed", .. }));
    }

    #[test]
    fn test_processed_above_total_rejected() {
        assert!(JobProgress::new(3, 4, "x").is_err());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Active(progress(1, 0)).is_terminal());
        assert!(JobStatus::Completed(serde_json::json!({})).is_terminal());
        assert!(JobStatus::Failed(JobFailure::new("boom")).is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_valid_lifecycle() {
        let queued = JobStatus::Queued;
        let a1 = JobStatus::Active(progress(3, 1));
        let a2 = JobStatus::Active(progress(3, 3));
        let done = JobStatus::Completed(serde_json::json!({"books": []}));

        assert!(queued.transition_to(&a1).is_ok());
        assert!(a1.transition_to(&a2).is_ok());
        assert!(a2.transition_to(&done).is_ok());
        assert!(queued.transition_to(&JobStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        let active = JobStatus::Active(progress(3, 2));

        // Never back to Queued
        assert!(active.transition_to(&JobStatus::Queued).is_err());

        // Never out of a terminal state
        let failed = JobStatus::Failed(JobFailure::new("x"));
        assert!(failed.transition_to(&active).is_err());
        assert!(JobStatus::Cancelled
            .transition_to(&JobStatus::Completed(serde_json::Value::Null))
            .is_err());

        // processed_items never decreases
        let err = active
            .transition_to(&JobStatus::Active(progress(3, 1)))
            .unwrap_err();
        assert_eq!(err, DomainError::ProgressRegressed { previous: 2, next: 1 });
    }

    #[test]
    fn test_total_may_grow_while_processed_is_monotonic() {
        let before = progress(0, 0);
        let after = progress(13, 0);
        assert!(before.advance_to(&after).is_ok());
    }

    #[test]
    fn test_generate_identifier() {
        let ids = SequentialIdProvider::new("job");
        let clock = FixedTimeProvider::new(42_000);
        let identifier = JobIdentifier::generate(JobType::CsvImport, &ids, &clock);

        assert_eq!(identifier.job_id.as_str(), "job-1");
        assert_eq!(identifier.job_type, JobType::CsvImport);
        assert_eq!(identifier.created_at, 42_000);
    }

    #[test]
    fn test_status_kind_round_trip() {
        for kind in StatusKind::ALL {
            assert_eq!(kind.to_string().parse::<StatusKind>().unwrap(), kind);
        }
        assert_eq!("csv-import".parse::<JobType>().unwrap(), JobType::CsvImport);
    }
}
