// Shelfwise HTTP API
//
// POST /jobs              submit, streamed NDJSON (ack, then terminal status)
// GET  /job/{id}/status   polling read of the durable state
// GET  /job/{id}/ws       live progress channel
// GET  /search            cache-first metadata search
// GET  /author/{name}     cache-first author lookup (warmed keys)
// GET  /health

pub mod error;
pub mod routes;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use shelfwise_core::application::{JobProcessor, SearchService, TokenBucket};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorResponse};

/// Header telling whether a search was answered from the cache
pub const CACHE_HEADER: &str = "x-shelfwise-cache";

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<JobProcessor>,
    pub search: Arc<SearchService>,
    /// Inbound limiter for job submission
    pub limiter: Arc<TokenBucket>,
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/jobs", post(routes::submit_job))
        .route("/job/{id}/status", get(routes::job_status))
        .route("/job/{id}/ws", get(ws::ws_handler))
        .route("/search", get(routes::search))
        .route("/author/{name}", get(routes::author))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
