// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Negative {field} count: {value}")]
    NegativeCount { field: &'static str, value: i64 },

    #[error("Processed items ({processed}) exceed total items ({total})")]
    ProgressOutOfRange { processed: u32, total: u32 },

    #[error("Progress regressed from {previous} to {next} processed items")]
    ProgressRegressed { previous: u32, next: u32 },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
