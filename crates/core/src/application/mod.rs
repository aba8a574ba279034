// Application Layer - Use Cases and Business Logic

pub mod backoff;
pub mod constants;
pub mod enrichment;
pub mod invocation;
pub mod maintenance;
pub mod processor;
pub mod rate_gate;
pub mod rate_limit;
pub mod recovery;
pub mod search;
pub mod state_hub;
pub mod warming;

// Re-exports
pub use backoff::Backoff;
pub use enrichment::{EnrichmentQueue, EnrichmentStats, EnrichmentWorker, LibraryEnricher, WorkerConfig};
pub use invocation::{InvocationContext, InvocationError};
pub use maintenance::MaintenanceScheduler;
pub use processor::{JobProcessor, ProcessorConfig};
pub use rate_gate::RateGate;
pub use rate_limit::TokenBucket;
pub use recovery::RecoveryService;
pub use search::{SearchOutcome, SearchService};
pub use state_hub::{JobStateHub, JobStateWriter};
pub use warming::{WarmingConfig, WarmingProcessor, WarmingReport, WarmingScheduler};
