//! Job Processor: runs one analysis inside one bounded invocation.
//!
//! No task is spawned. The caller (the submit handler) awaits `process`
//! inside the request it is serving, so the work lives exactly as long as the
//! invocation does.

use crate::application::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_DURATION,
};
use crate::application::invocation::InvocationContext;
use crate::application::state_hub::{JobStateHub, JobStateWriter};
use crate::domain::{JobFailure, JobStatus, JobSubmission, JobType};
use crate::error::{AppError, Result};
use crate::port::{AnalysisEngine, AnalysisError, AnalysisRequest, ProgressSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub max_duration: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

pub struct JobProcessor {
    hub: Arc<JobStateHub>,
    engine: Arc<dyn AnalysisEngine>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        hub: Arc<JobStateHub>,
        engine: Arc<dyn AnalysisEngine>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            hub,
            engine,
            config,
        }
    }

    pub fn hub(&self) -> &Arc<JobStateHub> {
        &self.hub
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Validate a submission and create its durable state (`Queued`)
    pub async fn accept(&self, submission: &JobSubmission) -> Result<JobStateWriter> {
        if submission.job_id.as_str().trim().is_empty() {
            return Err(AppError::Validation("jobId must not be empty".to_string()));
        }
        if submission.job_type == JobType::Enrichment {
            return Err(AppError::Validation(
                "enrichment jobs run client-side and cannot be submitted".to_string(),
            ));
        }
        if !submission.payload.is_object() {
            return Err(AppError::Validation("payload must be an object".to_string()));
        }

        self.hub.create(submission.identifier()).await
    }

    /// Run the job to a terminal status. Never returns a partial success.
    pub async fn process(&self, mut writer: JobStateWriter, payload: serde_json::Value) -> JobStatus {
        let request = AnalysisRequest {
            identifier: writer.identifier().clone(),
            payload,
        };
        let job_id = request.identifier.job_id.clone();
        let invocation = InvocationContext::new(self.config.idle_timeout, self.config.max_duration);

        info!(job_id = %job_id, job_type = %request.identifier.job_type, "Processing job");

        let outcome = invocation
            .run(self.drive(&mut writer, &request, &invocation))
            .await;

        let finished = match outcome {
            Ok(Ok(result)) => writer.complete(result).await,
            Ok(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "Analysis failed");
                let failure = JobFailure::new(e.to_string()).with_progress(writer.last_progress());
                writer.fail(failure).await
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    error = %e,
                    elapsed_ms = invocation.elapsed().as_millis() as u64,
                    "Invocation cancelled"
                );
                let failure = JobFailure::new(e.to_string()).with_progress(writer.last_progress());
                writer.fail(failure).await
            }
        };

        match finished {
            Ok(status) => status,
            Err(e) => {
                // Readers will see the job as lost once its heartbeat goes stale
                error!(job_id = %job_id, error = %e, "Failed to persist terminal status");
                JobStatus::Failed(JobFailure::new(format!("failed to record result: {}", e)))
            }
        }
    }

    /// Interleave engine progress and heartbeats until the engine returns
    async fn drive(
        &self,
        writer: &mut JobStateWriter,
        request: &AnalysisRequest,
        invocation: &InvocationContext,
    ) -> std::result::Result<serde_json::Value, AnalysisError> {
        if let Err(e) = writer.activate("Starting analysis").await {
            warn!(job_id = %writer.job_id(), error = %e, "Failed to record activation");
        }

        let (sink, mut reports) = ProgressSink::channel();
        let analysis = self.engine.analyze(request, sink);
        tokio::pin!(analysis);

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                Some(report) = reports.recv() => {
                    invocation.touch();
                    if let Err(e) = writer.progress(&report).await {
                        warn!(job_id = %writer.job_id(), error = %e, "Dropped progress report");
                    }
                }
                result = &mut analysis => {
                    while let Ok(report) = reports.try_recv() {
                        if let Err(e) = writer.progress(&report).await {
                            warn!(job_id = %writer.job_id(), error = %e, "Dropped progress report");
                        }
                    }
                    return result;
                }
                _ = heartbeat.tick() => {
                    invocation.touch();
                    if let Err(e) = writer.heartbeat().await {
                        warn!(job_id = %writer.job_id(), error = %e, "Heartbeat write failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, JobIdentifier, ProgressMessage, RetentionConfig};
    use crate::port::analysis_engine::mocks::{ScriptStep, ScriptedAnalysisEngine};
    use crate::port::job_state_store::mocks::InMemoryJobStateStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use serde_json::json;

    fn processor(engine: ScriptedAnalysisEngine, config: ProcessorConfig) -> JobProcessor {
        let hub = Arc::new(JobStateHub::new(
            Arc::new(InMemoryJobStateStore::new()),
            Arc::new(FixedTimeProvider::new(1_000)),
            RetentionConfig::default(),
            Duration::from_secs(60),
        ));
        JobProcessor::new(hub, Arc::new(engine), config)
    }

    fn submission(id: &str) -> JobSubmission {
        JobSubmission::new(
            &JobIdentifier::new(id, JobType::BookshelfScan, 1_000),
            json!({"image": "aGVsbG8="}),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_progress_then_completes() {
        let engine = ScriptedAnalysisEngine::even(13, Duration::from_secs(2), json!({"books": 13}));
        let processor = processor(engine, ProcessorConfig::default());

        let sub = submission("j1");
        let mut rx = processor.hub().subscribe(&sub.job_id);
        let writer = processor.accept(&sub).await.unwrap();
        let status = processor.process(writer, sub.payload.clone()).await;
        assert_eq!(status, JobStatus::Completed(json!({"books": 13})));

        let mut processed = Vec::new();
        let mut terminal = None;
        while let Ok(message) = rx.recv().await {
            match message {
                ProgressMessage::ProgressUpdate { progress, .. } => {
                    processed.push(progress.processed_items)
                }
                ProgressMessage::KeepAlive { .. } => {}
                other => terminal = Some(other),
            }
        }
        // Activation (0) then 1..=13, monotonic
        assert_eq!(processed.len(), 14);
        assert!(processed.windows(2).all(|w| w[0] <= w[1]));
        assert!(matches!(terminal, Some(ProgressMessage::Completion { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_silent_work_alive() {
        let engine = ScriptedAnalysisEngine::silent(Duration::from_secs(70), Ok(json!("done")));
        let processor = processor(engine, ProcessorConfig::default());

        let sub = submission("j2");
        let mut rx = processor.hub().subscribe(&sub.job_id);
        let writer = processor.accept(&sub).await.unwrap();
        let status = processor.process(writer, sub.payload.clone()).await;
        assert_eq!(status, JobStatus::Completed(json!("done")));

        let mut keep_alives = 0;
        while let Ok(message) = rx.recv().await {
            if matches!(message, ProgressMessage::KeepAlive { .. }) {
                keep_alives += 1;
            }
        }
        assert_eq!(keep_alives, 4); // 15s, 30s, 45s, 60s
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_without_heartbeats() {
        let engine = ScriptedAnalysisEngine::silent(Duration::from_secs(70), Ok(json!("done")));
        let config = ProcessorConfig {
            heartbeat_interval: Duration::from_secs(3600),
            ..ProcessorConfig::default()
        };
        let processor = processor(engine, config);

        let sub = submission("j3");
        let writer = processor.accept(&sub).await.unwrap();
        match processor.process(writer, sub.payload.clone()).await {
            JobStatus::Failed(failure) => assert!(failure.message.contains("idle")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_failure_keeps_partial_counts() {
        let steps = vec![
            ScriptStep {
                delay: Duration::from_secs(1),
                processed: 1,
                total: 4,
                status: "Reading".to_string(),
            },
            ScriptStep {
                delay: Duration::from_secs(1),
                processed: 2,
                total: 4,
                status: "Reading".to_string(),
            },
        ];
        let engine = ScriptedAnalysisEngine::new(
            steps,
            Err(AnalysisError::Upstream("AI timeout".to_string())),
        );
        let processor = processor(engine, ProcessorConfig::default());

        let sub = submission("j4");
        let writer = processor.accept(&sub).await.unwrap();
        match processor.process(writer, sub.payload.clone()).await {
            JobStatus::Failed(failure) => {
                assert_eq!(failure.message, "Analyzer failed: AI timeout");
                assert_eq!(failure.processed_items, Some(2));
                assert_eq!(failure.total_items, Some(4));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let state = processor
            .hub()
            .snapshot(&JobId::new("j4"))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(state.status, JobStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_rejects_enrichment_and_duplicates() {
        let engine = ScriptedAnalysisEngine::silent(Duration::ZERO, Ok(json!(null)));
        let processor = processor(engine, ProcessorConfig::default());

        let mut sub = submission("j5");
        sub.job_type = JobType::Enrichment;
        assert!(matches!(
            processor.accept(&sub).await.err(),
            Some(AppError::Validation(_))
        ));

        let sub = submission("j6");
        let _writer = processor.accept(&sub).await.unwrap();
        assert!(matches!(
            processor.accept(&sub).await.err(),
            Some(AppError::Conflict(_))
        ));
    }
}
