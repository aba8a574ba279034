//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{throttled, to_rpc_error};
use crate::types::{
    ClearResponse, EnqueueRequest, EnqueueResponse, ImportRequest, ImportResponse, JobCounts, ListRequest, ListResponse,
    MaintenanceRequest, MaintenanceResponse, PrioritizeRequest, PrioritizeResponse,
    StatsResponse, WarmingCursorResponse, WarmingLoadRequest, WarmingLoadResponse,
    WarmingRunResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use shelfwise_core::application::{EnrichmentWorker, JobStateHub, TokenBucket, WarmingScheduler};
use shelfwise_core::domain::{BookCandidate, JobId, LibraryRecord, RecordRef, StatusKind};
use shelfwise_core::error::AppError;
use shelfwise_core::port::{Maintenance, MaintenanceConfig, RecordStore, TimeProvider};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    hub: Arc<JobStateHub>,
    worker: Arc<EnrichmentWorker>,
    records: Arc<dyn RecordStore>,
    warming: Arc<WarmingScheduler>,
    maintenance: Arc<dyn Maintenance>,
    maintenance_config: MaintenanceConfig,
    time_provider: Arc<dyn TimeProvider>,
    rate_limiter: Arc<TokenBucket>,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        hub: Arc<JobStateHub>,
        worker: Arc<EnrichmentWorker>,
        records: Arc<dyn RecordStore>,
        warming: Arc<WarmingScheduler>,
        maintenance: Arc<dyn Maintenance>,
        time_provider: Arc<dyn TimeProvider>,
        rate_limiter: Arc<TokenBucket>,
    ) -> Self {
        Self {
            hub,
            worker,
            records,
            warming,
            maintenance,
            maintenance_config: MaintenanceConfig::default(),
            time_provider,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    fn check_rate(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.try_acquire() {
            Ok(())
        } else {
            Err(throttled())
        }
    }

    /// admin.stats.v1
    pub async fn stats(&self) -> Result<StatsResponse, ErrorObjectOwned> {
        let now = self.time_provider.now_millis();
        let counts = self
            .hub
            .store()
            .count_by_status(now)
            .await
            .map_err(to_rpc_error)?;
        let count = |kind: StatusKind| {
            counts
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };

        let stats = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            jobs: JobCounts {
                queued: count(StatusKind::Queued),
                active: count(StatusKind::Active),
                completed: count(StatusKind::Completed),
                failed: count(StatusKind::Failed),
                cancelled: count(StatusKind::Cancelled),
            },
            watched_jobs: self.hub.watched_jobs(),
            db_size_bytes: stats.db_size_bytes,
            cache_entries: stats.cache_entry_count,
            records: stats.record_count,
            enrichment: self.worker.stats(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }

    /// admin.maintenance.v1
    pub async fn maintenance(
        &self,
        params: MaintenanceRequest,
    ) -> Result<MaintenanceResponse, ErrorObjectOwned> {
        self.check_rate()?;

        let stats_before = self.maintenance.get_stats().await.map_err(to_rpc_error)?;
        let now = self.time_provider.now_millis();

        let mut report = self
            .maintenance
            .run_full_maintenance(&self.maintenance_config, now)
            .await
            .map_err(to_rpc_error)?;

        let mut vacuum_run = stats_before.db_size_mb > self.maintenance_config.max_db_size_mb;
        if params.force_vacuum && !vacuum_run {
            report.reclaimed_mb = self.maintenance.vacuum().await.map_err(to_rpc_error)?;
            report.stats = self.maintenance.get_stats().await.map_err(to_rpc_error)?;
            vacuum_run = true;
        }

        Ok(MaintenanceResponse {
            vacuum_run,
            purged_states: report.purged_states,
            purged_cache_entries: report.purged_cache_entries,
            reclaimed_mb: report.reclaimed_mb,
            db_size_before: stats_before.db_size_bytes,
            db_size_after: report.stats.db_size_bytes,
        })
    }

    /// library.import.v1
    ///
    /// Records are keyed `{job_id}:{index}`, so re-importing the same job
    /// overwrites instead of duplicating.
    pub async fn import_library(
        &self,
        params: ImportRequest,
    ) -> Result<ImportResponse, ErrorObjectOwned> {
        let job_id = params.job_id.trim();
        if job_id.is_empty() {
            return Err(to_rpc_error(AppError::Validation(
                "job_id must not be empty".to_string(),
            )));
        }

        let now = self.time_provider.now_millis();
        let source = JobId::new(job_id);

        // Records are keyed by book identity so overlapping imports upsert
        let titled: Vec<&BookCandidate> = params
            .books
            .iter()
            .filter(|b| !b.title.trim().is_empty())
            .collect();
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for book in titled.iter().copied() {
            let key = book.dedup_key();
            if seen.insert(key.clone()) {
                records.push(LibraryRecord::from_candidate(
                    RecordRef::new(key),
                    book,
                    Some(source.clone()),
                    now,
                ));
            }
        }
        let duplicates = titled.len() - records.len();

        // Already enriched books are not queued again
        let mut pending = Vec::new();
        for record in &records {
            let enriched = self
                .records
                .get(&record.record_ref)
                .await
                .map_err(to_rpc_error)?
                .is_some_and(|existing| existing.is_enriched());
            if !enriched {
                pending.push(record.record_ref.clone());
            }
        }

        self.records.insert_many(&records).await.map_err(to_rpc_error)?;

        let queue = self.worker.queue();
        let added = queue.enqueue_batch(pending).await.map_err(to_rpc_error)?;
        let worker_started = added > 0 && self.worker.start();

        info!(job_id = %job_id, records = records.len(), duplicates, added, "Library records imported");

        Ok(ImportResponse {
            record_refs: records.into_iter().map(|r| r.record_ref.to_string()).collect(),
            duplicates,
            added,
            queued: queue.count().await,
            worker_started,
        })
    }

    /// queue.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> Result<EnqueueResponse, ErrorObjectOwned> {
        self.check_rate()?;

        let refs: Vec<RecordRef> = params
            .record_refs
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .map(RecordRef::new)
            .collect();
        if refs.is_empty() {
            return Err(to_rpc_error(AppError::Validation(
                "record_refs must not be empty".to_string(),
            )));
        }

        let queue = self.worker.queue();
        let added = queue.enqueue_batch(refs).await.map_err(to_rpc_error)?;
        let worker_started = self.worker.start();

        info!(added, worker_started, "Records enqueued for enrichment");

        Ok(EnqueueResponse {
            added,
            queued: queue.count().await,
            worker_started,
        })
    }

    /// queue.prioritize.v1
    pub async fn prioritize(
        &self,
        params: PrioritizeRequest,
    ) -> Result<PrioritizeResponse, ErrorObjectOwned> {
        self.check_rate()?;

        let record_ref = params.record_ref.trim().to_string();
        if record_ref.is_empty() {
            return Err(to_rpc_error(AppError::Validation(
                "record_ref must not be empty".to_string(),
            )));
        }

        let queue = self.worker.queue();
        queue
            .prioritize(RecordRef::new(record_ref.clone()))
            .await
            .map_err(to_rpc_error)?;
        self.worker.start();

        Ok(PrioritizeResponse {
            record_ref,
            position: 0,
            queued: queue.count().await,
        })
    }

    /// queue.clear.v1
    pub async fn clear(&self) -> Result<ClearResponse, ErrorObjectOwned> {
        self.check_rate()?;
        let removed = self.worker.queue().clear().await.map_err(to_rpc_error)?;
        Ok(ClearResponse { removed })
    }

    /// queue.list.v1
    pub async fn list(&self, params: ListRequest) -> Result<ListResponse, ErrorObjectOwned> {
        let items = self.worker.queue().items().await;
        let total = items.len();
        Ok(ListResponse {
            items: items.into_iter().take(params.limit).collect(),
            total,
        })
    }

    /// warming.run.v1
    pub async fn warming_run(&self) -> Result<WarmingRunResponse, ErrorObjectOwned> {
        self.check_rate()?;
        let report = self.warming.try_run().await;
        Ok(WarmingRunResponse {
            ran: report.is_some(),
            report,
        })
    }

    /// warming.cursor.v1
    pub async fn warming_cursor(&self) -> Result<WarmingCursorResponse, ErrorObjectOwned> {
        let processor = self.warming.processor();
        let cursor = processor.cursor().await.map_err(to_rpc_error)?;
        let entities = processor
            .entities()
            .load_entities()
            .await
            .map_err(to_rpc_error)?
            .len();

        Ok(WarmingCursorResponse {
            name: processor.config().cursor_name.clone(),
            cursor,
            entities,
            last_report: self.warming.last_report(),
        })
    }

    /// warming.load.v1
    pub async fn warming_load(
        &self,
        params: WarmingLoadRequest,
    ) -> Result<WarmingLoadResponse, ErrorObjectOwned> {
        self.check_rate()?;
        let loaded = self
            .warming
            .processor()
            .entities()
            .replace_entities(&params.names)
            .await
            .map_err(to_rpc_error)?;

        info!(loaded, "Warming entity list replaced");
        Ok(WarmingLoadResponse { loaded })
    }
}
