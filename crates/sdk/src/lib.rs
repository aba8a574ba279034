//! Shelfwise SDK - Rust Client Library
//!
//! Talks to the Shelfwise daemon: submits jobs and follows them over the
//! WebSocket channel with a polling fallback, coordinates the
//! scan → import → enrichment pipeline, and wraps the admin JSON-RPC API.
//!
//! # Example
//!
//! ```no_run
//! use shelfwise_sdk::{JobClient, SelectorConfig, TransportSelector, WebSocketChannel};
//! use shelfwise_core::domain::{JobIdentifier, JobSubmission, JobType};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JobClient::new("http://127.0.0.1:8787")?;
//!     let selector = TransportSelector::new(
//!         Arc::new(WebSocketChannel::from_http_base(client.base_url())),
//!         Arc::new(client.clone()),
//!         SelectorConfig::default(),
//!     );
//!
//!     let identifier = JobIdentifier::new("scan-1", JobType::CsvImport, 0);
//!     let payload = serde_json::json!({"csv": "Title,Author\nDune,Frank Herbert\n"});
//!     let submitted = client.submit(&JobSubmission::new(&identifier, payload)).await?;
//!     let invocation = tokio::spawn(submitted.outcome());
//!
//!     let result = selector
//!         .track(&identifier, |p| println!("{}/{}", p.processed_items, p.total_items), CancellationToken::new())
//!         .await?;
//!     invocation.abort();
//!     println!("{}", result);
//!
//!     Ok(())
//! }
//! ```

pub mod board;
mod channel;
mod client;
pub mod coordinator;
mod error;
mod polling;
mod rpc;
pub mod selector;
mod stage;
pub mod transport;
mod types;

pub use board::{StatusBoard, StatusChange, TrackedJob};
pub use channel::WebSocketChannel;
pub use client::{JobClient, Submitted};
pub use coordinator::{
    CoordinatorConfig, EnrichmentBackend, JobCoordinator, PipelineInput, PipelineStage,
    ProgressCallback,
};
pub use error::{ClientError, PipelineError, Result};
pub use polling::poll_until_terminal;
pub use rpc::AdminClient;
pub use selector::{ProgressForwarder, SelectorConfig, TransportSelector};
pub use stage::RemoteAnalysisStage;
pub use transport::{ChannelEvent, LiveChannel, StatusSource};
pub use types::{
    ClearResponse, EnqueueResponse, ImportResponse, JobCounts, ListResponse, MaintenanceResponse,
    PrioritizeResponse, StatsResponse, WarmingCursorResponse, WarmingLoadResponse,
    WarmingRunResponse,
};
