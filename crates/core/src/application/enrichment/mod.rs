// Background enrichment: durable queue, singleton worker, record enricher

pub mod enricher;
pub mod queue;
pub mod worker;

pub use enricher::LibraryEnricher;
pub use queue::EnrichmentQueue;
pub use worker::{EnrichmentStats, EnrichmentWorker, WorkerConfig};
