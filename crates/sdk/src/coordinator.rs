//! Client-side job coordinator.
//!
//! A pipeline runs one `PipelineStage` (the remote analysis job), imports
//! the books it found through an `EnrichmentBackend`, then hands off to an
//! internal `enrichment` job that follows the worker until the queue is
//! drained. All state lives on the coordinator's `StatusBoard`.

use crate::board::{StatusBoard, StatusChange, TrackedJob};
use crate::error::{ClientError, PipelineError, Result};
use crate::types::ImportResponse;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shelfwise_core::application::EnrichmentStats;
use shelfwise_core::domain::{
    BookCandidate, JobFailure, JobId, JobIdentifier, JobProgress, JobStatus, JobType,
};
use shelfwise_core::port::{IdProvider, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type ProgressCallback = Box<dyn FnMut(&JobProgress) + Send>;

/// One stateless unit of pipeline work
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Used in failure messages: `"{name} stage failed: ..."`
    fn name(&self) -> &'static str;

    /// Run to completion. The result must carry `{"books": [...]}`.
    async fn run(
        &self,
        identifier: &JobIdentifier,
        payload: serde_json::Value,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value>;
}

/// Server side of enrichment: record import and worker statistics
#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    async fn import(&self, job_id: &JobId, books: Vec<BookCandidate>) -> Result<ImportResponse>;
    async fn stats(&self) -> Result<EnrichmentStats>;
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often the enrichment job samples worker statistics
    pub stats_interval: Duration,
    /// Consecutive stats failures before the enrichment job gives up
    pub max_stats_failures: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_secs(2),
            max_stats_failures: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub job_type: JobType,
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
struct StageOutput {
    books: Vec<BookCandidate>,
}

const ENRICHMENT_STAGE: &str = "enrichment";

pub struct JobCoordinator {
    stage: Arc<dyn PipelineStage>,
    backend: Arc<dyn EnrichmentBackend>,
    board: Arc<StatusBoard>,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn TimeProvider>,
    config: CoordinatorConfig,
    running: Mutex<HashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl JobCoordinator {
    pub fn new(
        stage: Arc<dyn PipelineStage>,
        backend: Arc<dyn EnrichmentBackend>,
        ids: Arc<dyn IdProvider>,
        clock: Arc<dyn TimeProvider>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            stage,
            backend,
            board: Arc::new(StatusBoard::new()),
            ids,
            clock,
            config,
            running: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a pipeline job and start it in the background.
    ///
    /// Returns immediately; the job is `Queued` on the board at that point.
    pub fn start_pipeline(self: &Arc<Self>, input: PipelineInput) -> JobIdentifier {
        let identifier =
            JobIdentifier::generate(input.job_type, self.ids.as_ref(), self.clock.as_ref());
        let cancel = self.track(&identifier);
        info!(job_id = %identifier.job_id, job_type = %identifier.job_type, "Pipeline queued");

        let this = self.clone();
        let spawned = identifier.clone();
        tokio::spawn(async move {
            this.run_pipeline(spawned, input.payload, cancel).await;
        });

        identifier
    }

    pub fn get_status(&self, job_id: &JobId) -> Option<TrackedJob> {
        self.board.get(job_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.board.subscribe()
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Resolve a running job as `Cancelled`. False if it is not running.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let Some(token) = self.lock_running().remove(job_id) else {
            return false;
        };
        token.cancel();
        let cancelled = self.board.set(job_id, JobStatus::Cancelled, self.now());
        info!(job_id = %job_id, "Job cancelled");
        cancelled
    }

    /// Cancel everything still running
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let running: Vec<JobId> = self.lock_running().drain().map(|(id, _)| id).collect();
        for job_id in running {
            self.board.set(&job_id, JobStatus::Cancelled, self.now());
        }
    }

    async fn run_pipeline(
        self: Arc<Self>,
        identifier: JobIdentifier,
        payload: serde_json::Value,
        cancel: CancellationToken,
    ) {
        let job_id = identifier.job_id.clone();
        let outcome = self.execute(&identifier, payload, &cancel).await;

        match outcome {
            Ok(result) => {
                self.board.set(&job_id, JobStatus::Completed(result), self.now());
                info!(job_id = %job_id, "Pipeline completed");
            }
            Err(PipelineError::Stage {
                source: ClientError::Cancelled,
                ..
            }) => {
                self.board.set(&job_id, JobStatus::Cancelled, self.now());
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Pipeline failed");
                let last = self.board.get(&job_id);
                let failure = JobFailure::new(e.to_string())
                    .with_progress(last.as_ref().and_then(|job| job.status.progress()));
                self.board.set(&job_id, JobStatus::Failed(failure), self.now());
            }
        }
        self.untrack(&job_id);
    }

    async fn execute(
        self: &Arc<Self>,
        identifier: &JobIdentifier,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> std::result::Result<serde_json::Value, PipelineError> {
        let job_id = &identifier.job_id;
        let stage = self.stage.name();

        self.board.set(
            job_id,
            JobStatus::Active(JobProgress::starting(format!("Running {}", stage))),
            self.now(),
        );

        let on_progress = {
            let board = self.board.clone();
            let clock = self.clock.clone();
            let job_id = job_id.clone();
            Box::new(move |progress: &JobProgress| {
                board.set(&job_id, JobStatus::Active(progress.clone()), clock.now_millis());
            }) as ProgressCallback
        };

        let output = self
            .stage
            .run(identifier, payload, on_progress, cancel.clone())
            .await
            .map_err(|e| PipelineError::stage(stage, e))?;

        let books = serde_json::from_value::<StageOutput>(output)
            .map_err(|e| PipelineError::stage(stage, e.into()))?
            .books;
        debug!(job_id = %job_id, books = books.len(), "Stage finished");

        if cancel.is_cancelled() {
            return Err(PipelineError::stage(ENRICHMENT_STAGE, ClientError::Cancelled));
        }

        let imported = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            imported = self.backend.import(job_id, books) => imported,
        };
        let imported = imported.map_err(|e| PipelineError::stage(ENRICHMENT_STAGE, e))?;

        // Already enriched records were not queued
        let enrichment = self.start_enrichment(imported.added);
        info!(
            job_id = %job_id,
            records = imported.record_refs.len(),
            duplicates = imported.duplicates,
            queued = imported.added,
            enrichment_job = %enrichment.job_id,
            "Records imported"
        );

        Ok(json!({
            "records": imported.record_refs,
            "enrichmentJobId": enrichment.job_id,
        }))
    }

    fn start_enrichment(self: &Arc<Self>, records: usize) -> JobIdentifier {
        let identifier =
            JobIdentifier::generate(JobType::Enrichment, self.ids.as_ref(), self.clock.as_ref());
        let cancel = self.track(&identifier);

        let this = self.clone();
        let job_id = identifier.job_id.clone();
        tokio::spawn(async move {
            this.follow_enrichment(&job_id, records, &cancel).await;
            this.untrack(&job_id);
        });

        identifier
    }

    /// Sample worker stats until the queue is drained and the worker idle
    async fn follow_enrichment(&self, job_id: &JobId, records: usize, cancel: &CancellationToken) {
        let total = u32::try_from(records).unwrap_or(u32::MAX);
        let mut done: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            let sampled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sampled = self.backend.stats() => sampled,
            };

            match sampled {
                Ok(stats) if stats.remaining == 0 && !stats.running => {
                    let result = serde_json::to_value(&stats).unwrap_or(serde_json::Value::Null);
                    self.board
                        .set(job_id, JobStatus::Completed(result), self.now());
                    info!(job_id = %job_id, processed = stats.processed, "Enrichment drained");
                    return;
                }
                Ok(stats) => {
                    failures = 0;
                    let waiting = u32::try_from(stats.remaining).unwrap_or(u32::MAX);
                    done = done.max(total.saturating_sub(waiting));
                    if let Ok(progress) = JobProgress::new(total, done, "Enriching records") {
                        self.board.set(job_id, JobStatus::Active(progress), self.now());
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(job_id = %job_id, error = %e, failures, "Enrichment stats unavailable");
                    if failures >= self.config.max_stats_failures {
                        let failure =
                            JobFailure::new(PipelineError::stage(ENRICHMENT_STAGE, e).to_string());
                        self.board.set(job_id, JobStatus::Failed(failure), self.now());
                        return;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.stats_interval) => {}
            }
        }
    }

    fn track(&self, identifier: &JobIdentifier) -> CancellationToken {
        let token = self.shutdown.child_token();
        self.lock_running()
            .insert(identifier.job_id.clone(), token.clone());
        self.board.insert(identifier, self.now());
        token
    }

    fn untrack(&self, job_id: &JobId) {
        self.lock_running().remove(job_id);
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for JobCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stage that reports scripted progress, then returns a fixed outcome.
    /// With `until_cancelled` it never finishes on its own.
    pub struct ScriptedStage {
        name: &'static str,
        progress: Vec<(u32, u32)>,
        step: Duration,
        outcome: Result<serde_json::Value>,
        until_cancelled: bool,
        runs: AtomicUsize,
    }

    impl ScriptedStage {
        pub fn new(name: &'static str, outcome: Result<serde_json::Value>) -> Self {
            Self {
                name,
                progress: Vec::new(),
                step: Duration::from_millis(10),
                outcome,
                until_cancelled: false,
                runs: AtomicUsize::new(0),
            }
        }

        /// Stage output listing `titles` as found books
        pub fn finding(name: &'static str, titles: &[&str]) -> Self {
            let books: Vec<BookCandidate> = titles
                .iter()
                .map(|title| BookCandidate {
                    title: title.to_string(),
                    author: "Unknown".to_string(),
                    isbn: None,
                    confidence: None,
                })
                .collect();
            Self::new(name, Ok(json!({ "books": books })))
        }

        pub fn with_progress(mut self, progress: Vec<(u32, u32)>) -> Self {
            self.progress = progress;
            self
        }

        pub fn until_cancelled(mut self) -> Self {
            self.until_cancelled = true;
            self
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PipelineStage for ScriptedStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(
            &self,
            _identifier: &JobIdentifier,
            _payload: serde_json::Value,
            mut on_progress: ProgressCallback,
            cancel: CancellationToken,
        ) -> Result<serde_json::Value> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            for (processed, total) in &self.progress {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                    _ = tokio::time::sleep(self.step) => {}
                }
                if let Ok(progress) = JobProgress::new(*total, *processed, "Analyzing") {
                    on_progress(&progress);
                }
            }
            if self.until_cancelled {
                cancel.cancelled().await;
                return Err(ClientError::Cancelled);
            }
            self.outcome.clone()
        }
    }

    /// Backend that assigns `{job_id}:{index}` refs and replays scripted stats
    pub struct MockEnrichmentBackend {
        import_error: Option<ClientError>,
        stats: Mutex<VecDeque<Result<EnrichmentStats>>>,
        imports: Mutex<Vec<(JobId, Vec<BookCandidate>)>>,
    }

    impl MockEnrichmentBackend {
        /// Stats answers are consumed in order; the last one repeats
        pub fn new(stats: Vec<Result<EnrichmentStats>>) -> Self {
            Self {
                import_error: None,
                stats: Mutex::new(stats.into()),
                imports: Mutex::new(Vec::new()),
            }
        }

        pub fn drained() -> Self {
            Self::new(vec![Ok(EnrichmentStats::default())])
        }

        pub fn failing_import(mut self, error: ClientError) -> Self {
            self.import_error = Some(error);
            self
        }

        pub fn imports(&self) -> Vec<(JobId, Vec<BookCandidate>)> {
            self.imports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EnrichmentBackend for MockEnrichmentBackend {
        async fn import(
            &self,
            job_id: &JobId,
            books: Vec<BookCandidate>,
        ) -> Result<ImportResponse> {
            if let Some(e) = &self.import_error {
                return Err(e.clone());
            }
            let record_refs: Vec<String> = books.iter().map(BookCandidate::dedup_key).collect();
            self.imports.lock().unwrap().push((job_id.clone(), books));
            Ok(ImportResponse {
                duplicates: 0,
                added: record_refs.len(),
                queued: record_refs.len(),
                worker_started: !record_refs.is_empty(),
                record_refs,
            })
        }

        async fn stats(&self) -> Result<EnrichmentStats> {
            let mut answers = self.stats.lock().unwrap();
            match answers.len() {
                0 => Ok(EnrichmentStats::default()),
                1 => answers[0].clone(),
                _ => answers.pop_front().unwrap_or_else(|| Ok(EnrichmentStats::default())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::{MockEnrichmentBackend, ScriptedStage};
    use super::*;
    use shelfwise_core::domain::StatusKind;
    use shelfwise_core::port::id_provider::mocks::SequentialIdProvider;
    use shelfwise_core::port::time_provider::mocks::FixedTimeProvider;

    fn coordinator(
        stage: Arc<ScriptedStage>,
        backend: Arc<MockEnrichmentBackend>,
    ) -> Arc<JobCoordinator> {
        Arc::new(JobCoordinator::new(
            stage,
            backend,
            Arc::new(SequentialIdProvider::new("job")),
            Arc::new(FixedTimeProvider::new(1_000)),
            CoordinatorConfig::default(),
        ))
    }

    fn input() -> PipelineInput {
        PipelineInput {
            job_type: JobType::BookshelfScan,
            payload: json!({"image": "aGVsbG8="}),
        }
    }

    fn busy(remaining: usize) -> Result<EnrichmentStats> {
        Ok(EnrichmentStats {
            remaining,
            running: true,
            ..EnrichmentStats::default()
        })
    }

    async fn terminal(coordinator: &JobCoordinator, job_id: &JobId) -> JobStatus {
        let mut changes = coordinator.subscribe();
        loop {
            if let Some(job) = coordinator.get_status(job_id) {
                if job.status.is_terminal() {
                    return job.status;
                }
            }
            let _ = changes.recv().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_returns_queued_identifier() {
        let stage = Arc::new(ScriptedStage::finding("import", &["Dune"]).until_cancelled());
        let c = coordinator(stage, Arc::new(MockEnrichmentBackend::drained()));

        let identifier = c.start_pipeline(input());

        assert_eq!(identifier.job_id, JobId::new("job-1"));
        assert_eq!(identifier.job_type, JobType::BookshelfScan);
        assert_eq!(identifier.created_at, 1_000);
        assert_eq!(
            c.get_status(&identifier.job_id).unwrap().status,
            JobStatus::Queued
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_imports_then_completes_enrichment() {
        let stage = Arc::new(
            ScriptedStage::finding("import", &["Dune", "Emma"])
                .with_progress(vec![(1, 2), (2, 2)]),
        );
        let backend = Arc::new(MockEnrichmentBackend::new(vec![
            busy(2),
            busy(1),
            Ok(EnrichmentStats {
                processed: 2,
                succeeded: 2,
                ..EnrichmentStats::default()
            }),
        ]));
        let c = coordinator(stage.clone(), backend.clone());

        let identifier = c.start_pipeline(input());
        let status = terminal(&c, &identifier.job_id).await;

        assert_eq!(
            status,
            JobStatus::Completed(json!({
                "records": ["title_author:dune:unknown", "title_author:emma:unknown"],
                "enrichmentJobId": "job-2",
            }))
        );
        let imports = backend.imports();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].0, identifier.job_id);
        assert_eq!(imports[0].1[1].title, "Emma");

        let enrichment = JobId::new("job-2");
        assert_eq!(
            c.get_status(&enrichment).unwrap().identifier.job_type,
            JobType::Enrichment
        );
        match terminal(&c, &enrichment).await {
            JobStatus::Completed(stats) => assert_eq!(stats["succeeded"], json!(2)),
            other => panic!("enrichment ended {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_progress_reaches_the_board() {
        let stage = Arc::new(
            ScriptedStage::finding("import", &["Dune"])
                .with_progress(vec![(1, 3), (2, 3), (3, 3)]),
        );
        let c = coordinator(stage, Arc::new(MockEnrichmentBackend::drained()));
        let mut changes = c.subscribe();

        let identifier = c.start_pipeline(input());
        terminal(&c, &identifier.job_id).await;

        let mut processed = Vec::new();
        while let Ok(change) = changes.try_recv() {
            if change.job_id != identifier.job_id {
                continue;
            }
            if let JobStatus::Active(progress) = change.status {
                processed.push(progress.processed_items);
            }
        }
        assert_eq!(processed, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_failure_skips_enrichment() {
        let stage = Arc::new(ScriptedStage::new(
            "import",
            Err(ClientError::JobFailed(JobFailure::new("no books detected"))),
        ));
        let backend = Arc::new(MockEnrichmentBackend::drained());
        let c = coordinator(stage, backend.clone());

        let identifier = c.start_pipeline(input());
        match terminal(&c, &identifier.job_id).await {
            JobStatus::Failed(failure) => {
                assert_eq!(failure.message, "import stage failed: no books detected")
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(backend.imports().is_empty());
        assert!(c.get_status(&JobId::new("job-2")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_failure_has_enrichment_context() {
        let stage = Arc::new(ScriptedStage::finding("import", &["Dune"]));
        let backend = Arc::new(
            MockEnrichmentBackend::drained()
                .failing_import(ClientError::Connection("rpc down".into())),
        );
        let c = coordinator(stage, backend);

        let identifier = c.start_pipeline(input());
        match terminal(&c, &identifier.job_id).await {
            JobStatus::Failed(failure) => {
                assert!(failure.message.starts_with("enrichment stage failed"));
                assert!(failure.message.contains("rpc down"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_stage_output_fails() {
        let stage = Arc::new(ScriptedStage::new("import", Ok(json!({"pages": 3}))));
        let c = coordinator(stage, Arc::new(MockEnrichmentBackend::drained()));

        let identifier = c.start_pipeline(input());
        assert_eq!(
            terminal(&c, &identifier.job_id).await.kind(),
            StatusKind::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_resolves_cancelled() {
        let stage = Arc::new(ScriptedStage::finding("import", &["Dune"]).until_cancelled());
        let backend = Arc::new(MockEnrichmentBackend::drained());
        let c = coordinator(stage.clone(), backend.clone());

        let identifier = c.start_pipeline(input());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stage.runs(), 1);

        assert!(c.cancel(&identifier.job_id));
        assert_eq!(
            c.get_status(&identifier.job_id).unwrap().status,
            JobStatus::Cancelled
        );
        assert!(!c.cancel(&identifier.job_id));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            c.get_status(&identifier.job_id).unwrap().status,
            JobStatus::Cancelled
        );
        assert!(backend.imports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_gives_up_after_repeated_stats_failures() {
        let stage = Arc::new(ScriptedStage::finding("import", &["Dune"]));
        let backend = Arc::new(MockEnrichmentBackend::new(vec![Err(
            ClientError::Connection("refused".into()),
        )]));
        let c = coordinator(stage, backend);

        let identifier = c.start_pipeline(input());
        terminal(&c, &identifier.job_id).await;

        match terminal(&c, &JobId::new("job-2")).await {
            JobStatus::Failed(failure) => {
                assert!(failure.message.starts_with("enrichment stage failed"))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_coordinator_has_its_own_board() {
        let a = coordinator(
            Arc::new(ScriptedStage::finding("import", &[]).until_cancelled()),
            Arc::new(MockEnrichmentBackend::drained()),
        );
        let b = coordinator(
            Arc::new(ScriptedStage::finding("import", &[]).until_cancelled()),
            Arc::new(MockEnrichmentBackend::drained()),
        );

        let identifier = a.start_pipeline(input());
        assert!(a.get_status(&identifier.job_id).is_some());
        assert!(b.board().is_empty());
    }
}
