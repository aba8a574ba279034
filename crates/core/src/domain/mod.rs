// Domain Layer - Pure business logic and entities

pub mod cursor;
pub mod error;
pub mod job;
pub mod message;
pub mod queue;
pub mod record;
pub mod state;

// Re-exports
pub use cursor::BatchCursor;
pub use error::DomainError;
pub use job::{JobFailure, JobId, JobIdentifier, JobProgress, JobStatus, JobType, StatusKind};
pub use message::{
    ClientSignal, JobStatusResponse, JobSubmission, ProgressMessage, SubmitAck, WireKind,
    WireMessage,
};
pub use queue::{QueueItem, RecordRef};
pub use record::{
    normalize_isbn, normalize_text, BookCandidate, LibraryRecord, MetadataRecord, SearchQuery,
};
pub use state::{DurableJobState, RetentionConfig};
