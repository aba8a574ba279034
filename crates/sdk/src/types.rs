//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from the api-rpc crate.

use serde::{Deserialize, Serialize};
use shelfwise_core::application::{EnrichmentStats, WarmingReport};
use shelfwise_core::domain::{BatchCursor, BookCandidate, QueueItem};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCounts {
    pub queued: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// Response from admin.stats.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub jobs: JobCounts,
    pub watched_jobs: usize,
    pub db_size_bytes: i64,
    pub cache_entries: i64,
    pub records: i64,
    pub enrichment: EnrichmentStats,
    pub uptime_seconds: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct MaintenanceRequest {
    pub force_vacuum: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceResponse {
    pub vacuum_run: bool,
    pub purged_states: u64,
    pub purged_cache_entries: u64,
    pub reclaimed_mb: f64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}

/// Persist analysis output server-side and queue it for enrichment
#[derive(Debug, Clone, Serialize)]
pub struct ImportRequest {
    pub job_id: String,
    pub books: Vec<BookCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    pub record_refs: Vec<String>,
    /// Books dropped because an earlier book in the same import had the same identity
    #[serde(default)]
    pub duplicates: usize,
    pub added: usize,
    pub queued: usize,
    pub worker_started: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueRequest {
    pub record_refs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueResponse {
    pub added: usize,
    pub queued: usize,
    pub worker_started: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrioritizeRequest {
    pub record_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrioritizeResponse {
    pub record_ref: String,
    pub position: usize,
    pub queued: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRequest {
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    pub items: Vec<QueueItem>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarmingRunResponse {
    /// False when a run was already in progress
    pub ran: bool,
    pub report: Option<WarmingReport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarmingCursorResponse {
    pub name: String,
    pub cursor: Option<BatchCursor>,
    pub entities: usize,
    pub last_report: Option<WarmingReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmingLoadRequest {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarmingLoadResponse {
    pub loaded: usize,
}
