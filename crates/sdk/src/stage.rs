//! Pipeline stage backed by a remote analysis job

use crate::client::JobClient;
use crate::coordinator::{PipelineStage, ProgressCallback};
use crate::error::{ClientError, Result};
use crate::selector::TransportSelector;
use async_trait::async_trait;
use shelfwise_core::domain::{JobIdentifier, JobSubmission};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Submits the job to `POST /jobs` and follows it with the selector.
///
/// The submission request is the invocation that does the work, so it is
/// kept alive in a task until tracking ends.
pub struct RemoteAnalysisStage {
    name: &'static str,
    client: JobClient,
    selector: Arc<TransportSelector>,
}

impl RemoteAnalysisStage {
    pub fn new(client: JobClient, selector: Arc<TransportSelector>) -> Self {
        Self {
            name: "import",
            client,
            selector,
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[async_trait]
impl PipelineStage for RemoteAnalysisStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(
        &self,
        identifier: &JobIdentifier,
        payload: serde_json::Value,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value> {
        let submission = JobSubmission::new(identifier, payload);
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            submitted = self.client.submit(&submission) => submitted?,
        };
        if !submitted.ack.accepted {
            return Err(ClientError::Rejected {
                status: 200,
                message: format!("job {} was not accepted", identifier.job_id),
            });
        }

        let invocation = tokio::spawn(submitted.outcome());
        let tracked = self
            .selector
            .track(identifier, on_progress, cancel)
            .await;

        // Terminal or cancelled: either way the invocation is no longer needed
        if !invocation.is_finished() {
            debug!(job_id = %identifier.job_id, "Releasing submission stream");
        }
        invocation.abort();

        tracked
    }
}
