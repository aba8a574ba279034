// Analysis Engine Port (the long-running AI work behind a job)

use crate::domain::{JobIdentifier, JobType};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Analysis failure, carried verbatim into the job's failure message
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unsupported job type: {0}")]
    Unsupported(JobType),

    #[error("Analyzer failed: {0}")]
    Upstream(String),

    #[error("Analyzer unreachable: {0}")]
    Transport(String),
}

/// Input of one analysis
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub identifier: JobIdentifier,
    pub payload: serde_json::Value,
}

/// Raw progress reported by an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub processed: u32,
    pub total: u32,
    pub status: String,
}

/// Progress channel handed to the engine for the duration of one analysis
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressReport>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report progress. Dropped silently once the job is no longer listening.
    pub fn report(&self, processed: u32, total: u32, status: impl Into<String>) {
        let _ = self.tx.send(ProgressReport {
            processed,
            total,
            status: status.into(),
        });
    }
}

#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        progress: ProgressSink,
    ) -> Result<serde_json::Value, AnalysisError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// One scripted step: wait, then report
    #[derive(Debug, Clone)]
    pub struct ScriptStep {
        pub delay: Duration,
        pub processed: u32,
        pub total: u32,
        pub status: String,
    }

    /// Engine that replays a fixed script of progress reports
    pub struct ScriptedAnalysisEngine {
        steps: Vec<ScriptStep>,
        final_delay: Duration,
        outcome: Result<serde_json::Value, AnalysisError>,
        calls: AtomicUsize,
    }

    impl ScriptedAnalysisEngine {
        pub fn new(steps: Vec<ScriptStep>, outcome: Result<serde_json::Value, AnalysisError>) -> Self {
            Self {
                steps,
                final_delay: Duration::ZERO,
                outcome,
                calls: AtomicUsize::new(0),
            }
        }

        /// `total` evenly spaced updates `1/total .. total/total`
        pub fn even(total: u32, step: Duration, result: serde_json::Value) -> Self {
            let steps = (1..=total)
                .map(|i| ScriptStep {
                    delay: step,
                    processed: i,
                    total,
                    status: format!("Processing {} of {}", i, total),
                })
                .collect();
            Self::new(steps, Ok(result))
        }

        /// Silent work of `duration` before the outcome
        pub fn silent(duration: Duration, outcome: Result<serde_json::Value, AnalysisError>) -> Self {
            Self::new(Vec::new(), outcome).with_final_delay(duration)
        }

        pub fn with_final_delay(mut self, delay: Duration) -> Self {
            self.final_delay = delay;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisEngine for ScriptedAnalysisEngine {
        async fn analyze(
            &self,
            _request: &AnalysisRequest,
            progress: ProgressSink,
        ) -> Result<serde_json::Value, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for step in &self.steps {
                tokio::time::sleep(step.delay).await;
                progress.report(step.processed, step.total, step.status.clone());
            }
            tokio::time::sleep(self.final_delay).await;
            self.outcome.clone()
        }
    }
}
