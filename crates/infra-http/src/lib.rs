// Shelfwise Infrastructure - HTTP Adapters
// Implements: AnalysisEngine (analyzer service), MetadataProvider (book search)

mod analysis_engine;
mod metadata_provider;

pub use analysis_engine::{HttpAnalysisEngine, CSV_CHUNK_ROWS};
pub use metadata_provider::HttpMetadataProvider;

use std::time::Duration;

const USER_AGENT: &str = concat!("shelfwise/", env!("CARGO_PKG_VERSION"));

/// Shared reqwest client builder
fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}
