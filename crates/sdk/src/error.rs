//! SDK Error Types

use shelfwise_core::domain::JobFailure;
use thiserror::Error;

/// SDK Result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// SDK Error
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// Transport unreachable, timed out or answering 5xx
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    /// Terminal failure reported by the server, surfaced verbatim
    #[error("{0}")]
    JobFailed(JobFailure),

    #[error("Job cancelled")]
    Cancelled,

    /// Submission refused (400, 409, 429)
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i32, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Cancellation is user-initiated and does not count as a failure
    pub fn is_failure(&self) -> bool {
        !matches!(self, ClientError::Cancelled)
    }

    /// Transport-level errors worth retrying (never business failures)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_) | ClientError::NotFound(_) | ClientError::Protocol(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Protocol(e.to_string())
        } else {
            ClientError::Connection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

impl From<jsonrpsee::core::ClientError> for ClientError {
    fn from(e: jsonrpsee::core::ClientError) -> Self {
        match e {
            jsonrpsee::core::ClientError::Call(call_err) => ClientError::Rpc {
                code: call_err.code(),
                message: call_err.message().to_string(),
            },
            jsonrpsee::core::ClientError::Transport(e) => ClientError::Connection(e.to_string()),
            jsonrpsee::core::ClientError::RestartNeeded(_) => {
                ClientError::Connection("Connection restart needed".to_string())
            }
            jsonrpsee::core::ClientError::RequestTimeout => {
                ClientError::Connection("RPC request timed out".to_string())
            }
            jsonrpsee::core::ClientError::ParseError(e) => ClientError::Protocol(e.to_string()),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

/// Pipeline failure with the stage it happened in
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: ClientError,
    },
}

impl PipelineError {
    pub fn stage(stage: &'static str, source: ClientError) -> Self {
        PipelineError::Stage { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_not_a_failure() {
        assert!(!ClientError::Cancelled.is_failure());
        assert!(ClientError::JobFailed(JobFailure::new("boom")).is_failure());
        assert!(ClientError::Connection("down".into()).is_failure());
    }

    #[test]
    fn test_business_failures_are_not_transport_errors() {
        assert!(ClientError::Connection("reset".into()).is_transport());
        assert!(ClientError::NotFound("j1".into()).is_transport());
        assert!(!ClientError::JobFailed(JobFailure::new("bad image")).is_transport());
        assert!(!ClientError::Cancelled.is_transport());
    }

    #[test]
    fn test_stage_context_in_message() {
        let err = PipelineError::stage(
            "import",
            ClientError::JobFailed(JobFailure::new("no books detected")),
        );
        assert_eq!(err.to_string(), "import stage failed: no books detected");
    }
}
