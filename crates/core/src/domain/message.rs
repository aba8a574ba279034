//! Wire types shared by the HTTP API and the client SDK.
//!
//! `ProgressMessage` is the typed tagged union used everywhere in code.
//! `WireMessage` is the flat JSON shape that travels over the channel:
//!
//! ```text
//! {type, jobId, progress?, processedItems?, totalItems?, currentStatus?,
//!  estimatedTimeRemaining?, keepAlive?, result?, error?}
//! ```
//!
//! Heartbeats use `type: "progress"` with `keepAlive: true`. On every other
//! message `keepAlive` is absent, never `false`. A cancelled job ends with
//! `type: "cancelled"`, which is not a failure.

use crate::domain::error::{DomainError, Result};
use crate::domain::job::{
    JobFailure, JobId, JobIdentifier, JobProgress, JobStatus, JobType, StatusKind,
};
use serde::{Deserialize, Serialize};

/// Progress Message (typed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMessage", try_from = "WireMessage")]
pub enum ProgressMessage {
    ProgressUpdate { job_id: JobId, progress: JobProgress },
    KeepAlive { job_id: JobId },
    Completion { job_id: JobId, result: serde_json::Value },
    Error { job_id: JobId, failure: JobFailure },
    Cancelled { job_id: JobId },
}

impl ProgressMessage {
    pub fn job_id(&self) -> &JobId {
        match self {
            ProgressMessage::ProgressUpdate { job_id, .. }
            | ProgressMessage::KeepAlive { job_id }
            | ProgressMessage::Completion { job_id, .. }
            | ProgressMessage::Error { job_id, .. }
            | ProgressMessage::Cancelled { job_id } => job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressMessage::Completion { .. }
                | ProgressMessage::Error { .. }
                | ProgressMessage::Cancelled { .. }
        )
    }

    /// Message describing a status, if the status carries anything to push.
    /// `Queued` has no business progress yet.
    pub fn from_status(job_id: &JobId, status: &JobStatus) -> Option<Self> {
        let job_id = job_id.clone();
        match status {
            JobStatus::Queued => None,
            JobStatus::Active(progress) => Some(ProgressMessage::ProgressUpdate {
                job_id,
                progress: progress.clone(),
            }),
            JobStatus::Completed(result) => Some(ProgressMessage::Completion {
                job_id,
                result: result.clone(),
            }),
            JobStatus::Failed(failure) => Some(ProgressMessage::Error {
                job_id,
                failure: failure.clone(),
            }),
            JobStatus::Cancelled => Some(ProgressMessage::Cancelled { job_id }),
        }
    }
}

/// Wire message discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    Progress,
    Complete,
    Error,
    Cancelled,
}

/// Flat JSON shape of a progress message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: WireKind,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_items: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireMessage {
    fn bare(kind: WireKind, job_id: JobId) -> Self {
        Self {
            kind,
            job_id: job_id.as_str().to_string(),
            progress: None,
            processed_items: None,
            total_items: None,
            current_status: None,
            estimated_time_remaining: None,
            keep_alive: None,
            result: None,
            error: None,
        }
    }
}

impl From<ProgressMessage> for WireMessage {
    fn from(message: ProgressMessage) -> Self {
        match message {
            ProgressMessage::ProgressUpdate { job_id, progress } => {
                let mut wire = WireMessage::bare(WireKind::Progress, job_id);
                wire.progress = Some(progress.fraction_completed());
                wire.processed_items = Some(progress.processed_items as i64);
                wire.total_items = Some(progress.total_items as i64);
                wire.current_status = Some(progress.current_status);
                wire.estimated_time_remaining = progress.estimated_time_remaining;
                wire
            }
            ProgressMessage::KeepAlive { job_id } => {
                let mut wire = WireMessage::bare(WireKind::Progress, job_id);
                wire.keep_alive = Some(true);
                wire
            }
            ProgressMessage::Completion { job_id, result } => {
                let mut wire = WireMessage::bare(WireKind::Complete, job_id);
                wire.progress = Some(1.0);
                wire.result = Some(result);
                wire
            }
            ProgressMessage::Error { job_id, failure } => {
                let mut wire = WireMessage::bare(WireKind::Error, job_id);
                wire.processed_items = failure.processed_items.map(i64::from);
                wire.total_items = failure.total_items.map(i64::from);
                wire.error = Some(failure.message);
                wire
            }
            ProgressMessage::Cancelled { job_id } => WireMessage::bare(WireKind::Cancelled, job_id),
        }
    }
}

impl TryFrom<WireMessage> for ProgressMessage {
    type Error = DomainError;

    fn try_from(wire: WireMessage) -> Result<Self> {
        let job_id = JobId::new(wire.job_id);
        match wire.kind {
            WireKind::Progress if wire.keep_alive == Some(true) => {
                Ok(ProgressMessage::KeepAlive { job_id })
            }
            WireKind::Progress => {
                let (Some(total), Some(processed)) = (wire.total_items, wire.processed_items)
                else {
                    return Err(DomainError::MalformedMessage(
                        "progress message without item counts".to_string(),
                    ));
                };
                let progress = JobProgress::from_counts(
                    total,
                    processed,
                    wire.current_status.unwrap_or_default(),
                )?
                .with_eta(wire.estimated_time_remaining);
                Ok(ProgressMessage::ProgressUpdate { job_id, progress })
            }
            WireKind::Complete => Ok(ProgressMessage::Completion {
                job_id,
                result: wire.result.unwrap_or(serde_json::Value::Null),
            }),
            WireKind::Error => {
                let mut failure =
                    JobFailure::new(wire.error.unwrap_or_else(|| "Unknown error".to_string()));
                failure.processed_items = wire.processed_items.and_then(|v| u32::try_from(v).ok());
                failure.total_items = wire.total_items.and_then(|v| u32::try_from(v).ok());
                Ok(ProgressMessage::Error { job_id, failure })
            }
            WireKind::Cancelled => Ok(ProgressMessage::Cancelled { job_id }),
        }
    }
}

/// Signal sent by the client after the channel opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientSignal {
    Ready,
}

/// `POST /jobs` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub job_id: JobId,
    pub job_type: JobType,
    pub created_at: i64,
    pub payload: serde_json::Value,
}

impl JobSubmission {
    pub fn new(identifier: &JobIdentifier, payload: serde_json::Value) -> Self {
        Self {
            job_id: identifier.job_id.clone(),
            job_type: identifier.job_type,
            created_at: identifier.created_at,
            payload,
        }
    }

    pub fn identifier(&self) -> JobIdentifier {
        JobIdentifier::new(self.job_id.clone(), self.job_type, self.created_at)
    }
}

/// First line of the streamed `POST /jobs` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    pub accepted: bool,
    pub job_id: JobId,
}

/// `GET /job/{id}/status` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub job_type: JobType,
    pub status: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub updated_at: i64,
}

impl JobStatusResponse {
    pub fn new(identifier: &JobIdentifier, status: &JobStatus, updated_at: i64) -> Self {
        let mut response = Self {
            job_id: identifier.job_id.clone(),
            job_type: identifier.job_type,
            status: status.kind(),
            progress: None,
            result: None,
            error: None,
            updated_at,
        };
        match status {
            JobStatus::Active(progress) => response.progress = Some(progress.clone()),
            JobStatus::Completed(result) => response.result = Some(result.clone()),
            JobStatus::Failed(failure) => response.error = Some(failure.clone()),
            JobStatus::Queued | JobStatus::Cancelled => {}
        }
        response
    }

    /// Rebuild the typed status from the flat response
    pub fn to_status(&self) -> Result<JobStatus> {
        match self.status {
            StatusKind::Queued => Ok(JobStatus::Queued),
            StatusKind::Active => {
                let progress = self.progress.clone().ok_or_else(|| {
                    DomainError::MalformedMessage("active status without progress".to_string())
                })?;
                progress.validate()?;
                Ok(JobStatus::Active(progress))
            }
            StatusKind::Completed => Ok(JobStatus::Completed(
                self.result.clone().unwrap_or(serde_json::Value::Null),
            )),
            StatusKind::Failed => Ok(JobStatus::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| JobFailure::new("Unknown error")),
            )),
            StatusKind::Cancelled => Ok(JobStatus::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keep_alive_wire_shape() {
        let msg = ProgressMessage::KeepAlive {
            job_id: JobId::new("j1"),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "progress", "jobId": "j1", "keepAlive": true}));
    }

    #[test]
    fn test_progress_update_has_no_keep_alive_field() {
        let msg = ProgressMessage::ProgressUpdate {
            job_id: JobId::new("j1"),
            progress: JobProgress::new(13, 4, "Analyzing").unwrap(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("keepAlive").is_none());
        assert_eq!(value["type"], "progress");
        assert_eq!(value["processedItems"], 4);
        assert_eq!(value["totalItems"], 13);
        assert_eq!(value["currentStatus"], "Analyzing");
    }

    #[test]
    fn test_parse_server_messages() {
        let keep_alive: ProgressMessage =
            serde_json::from_value(json!({"type": "progress", "jobId": "a", "keepAlive": true}))
                .unwrap();
        assert!(matches!(keep_alive, ProgressMessage::KeepAlive { .. }));

        let done: ProgressMessage = serde_json::from_value(
            json!({"type": "complete", "jobId": "a", "result": {"books": [1, 2]}}),
        )
        .unwrap();
        assert_eq!(
            done,
            ProgressMessage::Completion {
                job_id: JobId::new("a"),
                result: json!({"books": [1, 2]}),
            }
        );

        let failed: ProgressMessage = serde_json::from_value(
            json!({"type": "error", "jobId": "a", "error": "AI timeout", "processedItems": 3}),
        )
        .unwrap();
        match failed {
            ProgressMessage::Error { failure, .. } => {
                assert_eq!(failure.message, "AI timeout");
                assert_eq!(failure.processed_items, Some(3));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_reject_negative_counts_on_wire() {
        let result: std::result::Result<ProgressMessage, _> = serde_json::from_value(
            json!({"type": "progress", "jobId": "a", "processedItems": -1, "totalItems": 3}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_status_response_round_trip() {
        let identifier = JobIdentifier::new("j9", JobType::BookshelfScan, 10);
        let status = JobStatus::Active(JobProgress::new(5, 2, "Scanning").unwrap());
        let response = JobStatusResponse::new(&identifier, &status, 99);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "active");
        assert_eq!(value["jobType"], "bookshelf-scan");

        let parsed: JobStatusResponse = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.to_status().unwrap(), status);
    }

    #[test]
    fn test_ready_signal_shape() {
        assert_eq!(
            serde_json::to_string(&ClientSignal::Ready).unwrap(),
            r#"{"type":"ready"}"#
        );
    }

    #[test]
    fn test_cancelled_is_its_own_terminal_kind() {
        let msg = ProgressMessage::from_status(&JobId::new("j1"), &JobStatus::Cancelled).unwrap();
        assert_eq!(msg, ProgressMessage::Cancelled { job_id: JobId::new("j1") });
        assert!(msg.is_terminal());

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "cancelled", "jobId": "j1"}));

        let parsed: ProgressMessage = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, msg);
    }
}
