//! Polling transport: an explicit cancellable loop over `GET /job/{id}/status`

use crate::error::{ClientError, Result};
use crate::selector::{ProgressForwarder, SelectorConfig};
use crate::transport::StatusSource;
use shelfwise_core::domain::{JobId, JobProgress, JobStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Poll until the job is terminal.
///
/// Consecutive transport errors are retried with backoff, at most
/// `max_poll_retries` times in a row; business failures return at once.
pub async fn poll_until_terminal<F>(
    source: &dyn StatusSource,
    job_id: &JobId,
    config: &SelectorConfig,
    forwarder: &mut ProgressForwarder<F>,
    cancel: &CancellationToken,
) -> Result<serde_json::Value>
where
    F: FnMut(&JobProgress) + Send,
{
    let mut failures: u32 = 0;

    loop {
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            answer = source.fetch_status(job_id) => answer,
        };

        let status = answer.and_then(|response| {
            response
                .to_status()
                .map_err(|e| ClientError::Protocol(e.to_string()))
        });

        let delay = match status {
            Ok(status) => {
                failures = 0;
                match status {
                    JobStatus::Queued => {}
                    JobStatus::Active(progress) => forwarder.forward(&progress),
                    JobStatus::Completed(result) => return Ok(result),
                    JobStatus::Failed(failure) => return Err(ClientError::JobFailed(failure)),
                    JobStatus::Cancelled => return Err(ClientError::Cancelled),
                }
                config.poll_interval
            }
            Err(e) if e.is_transport() => {
                if failures >= config.max_poll_retries {
                    warn!(job_id = %job_id, error = %e, failures, "Polling gave up");
                    return Err(exhausted(e));
                }
                let delay = config.backoff.delay(failures, job_id.as_str());
                failures += 1;
                debug!(
                    job_id = %job_id,
                    error = %e,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    "Poll failed, retrying"
                );
                delay
            }
            Err(e) => return Err(e),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Error surfaced once retries are used up: `NotFound` if the last failure was a 404
fn exhausted(last: ClientError) -> ClientError {
    match last {
        ClientError::NotFound(id) => ClientError::NotFound(id),
        ClientError::Connection(message) => ClientError::Connection(message),
        other => ClientError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mocks::ScriptedStatusSource;
    use serde_json::json;
    use shelfwise_core::domain::{JobFailure, JobIdentifier, JobStatusResponse, JobType};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn response(status: JobStatus) -> Result<JobStatusResponse> {
        let identifier = JobIdentifier::new("j1", JobType::BookshelfScan, 0);
        Ok(JobStatusResponse::new(&identifier, &status, 0))
    }

    fn active(processed: u32) -> Result<JobStatusResponse> {
        response(JobStatus::Active(
            JobProgress::new(5, processed, "Analyzing").unwrap(),
        ))
    }

    fn recording() -> (Arc<Mutex<Vec<u32>>>, ProgressForwarder<impl FnMut(&JobProgress) + Send>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let forwarder = ProgressForwarder::new(move |p: &JobProgress| {
            sink.lock().unwrap().push(p.processed_items)
        });
        (seen, forwarder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed() {
        let source = ScriptedStatusSource::new(vec![
            response(JobStatus::Queued),
            active(1),
            active(1),
            active(3),
            response(JobStatus::Completed(json!({"books": 5}))),
        ]);
        let (seen, mut forwarder) = recording();

        let result = poll_until_terminal(
            &source,
            &JobId::new("j1"),
            &SelectorConfig::default(),
            &mut forwarder,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result, json!({"books": 5}));
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_retry_then_recover() {
        let source = ScriptedStatusSource::new(vec![
            Err(ClientError::Connection("reset".into())),
            Err(ClientError::Connection("reset".into())),
            response(JobStatus::Completed(json!("done"))),
        ]);
        let (_, mut forwarder) = recording();

        let result = poll_until_terminal(
            &source,
            &JobId::new("j1"),
            &SelectorConfig::default(),
            &mut forwarder,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Ok(json!("done")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let source = ScriptedStatusSource::new(vec![Err(ClientError::NotFound("j1".into()))]);
        let (_, mut forwarder) = recording();

        let result = poll_until_terminal(
            &source,
            &JobId::new("j1"),
            &SelectorConfig::default(),
            &mut forwarder,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ClientError::NotFound(_))));
        // First attempt plus three retries
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_failure_is_not_retried() {
        let source = ScriptedStatusSource::new(vec![response(JobStatus::Failed(
            JobFailure::new("image unreadable"),
        ))]);
        let (_, mut forwarder) = recording();

        let result = poll_until_terminal(
            &source,
            &JobId::new("j1"),
            &SelectorConfig::default(),
            &mut forwarder,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(
            result,
            Err(ClientError::JobFailed(JobFailure::new("image unreadable")))
        );
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_between_polls() {
        let source = Arc::new(ScriptedStatusSource::new(vec![active(1)]));
        let cancel = CancellationToken::new();

        let task = {
            let source = source.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (_, mut forwarder) = recording();
                poll_until_terminal(
                    source.as_ref(),
                    &JobId::new("j1"),
                    &SelectorConfig::default(),
                    &mut forwarder,
                    &cancel,
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), Err(ClientError::Cancelled));

        let calls = source.calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls(), calls);
    }
}
