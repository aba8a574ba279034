// Port Layer - Interfaces for external dependencies

pub mod analysis_engine;
pub mod cursor_store;
pub mod enrichment_provider;
pub mod entity_source;
pub mod id_provider; // For deterministic testing
pub mod job_state_store;
pub mod maintenance;
pub mod metadata_cache;
pub mod metadata_provider;
pub mod queue_persistence;
pub mod record_store;
pub mod time_provider;

// Re-exports
pub use analysis_engine::{
    AnalysisEngine, AnalysisError, AnalysisRequest, ProgressReport, ProgressSink,
};
pub use cursor_store::CursorStore;
pub use enrichment_provider::EnrichmentProvider;
pub use entity_source::EntitySource;
pub use id_provider::{IdProvider, UuidProvider};
pub use job_state_store::JobStateStore;
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceReport, MaintenanceStats};
pub use metadata_cache::{CacheEntry, MetadataCache};
pub use metadata_provider::{MetadataProvider, ProviderError};
pub use queue_persistence::QueuePersistence;
pub use record_store::RecordStore;
pub use time_provider::{SystemTimeProvider, TimeProvider};
