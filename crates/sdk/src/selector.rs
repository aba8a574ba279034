//! Transport selection: push channel first, polling as the fallback.
//!
//! One `track` call owns one job's observation from start to terminal
//! state. Progress handed to the caller is deduplicated and monotonic
//! across the switch from channel to polling.

use crate::error::{ClientError, Result};
use crate::polling::poll_until_terminal;
use crate::transport::{ChannelEvent, LiveChannel, StatusSource};
use shelfwise_core::application::Backoff;
use shelfwise_core::domain::{JobId, JobIdentifier, JobProgress, ProgressMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub connect_timeout: Duration,
    /// Silence on an open channel longer than this abandons it
    pub stall_timeout: Duration,
    pub poll_interval: Duration,
    /// Consecutive transport errors tolerated while polling
    pub max_poll_retries: u32,
    pub backoff: Backoff,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            stall_timeout: Duration::from_secs(45),
            poll_interval: Duration::from_secs(2),
            max_poll_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

/// Wraps the caller's handler: drops repeats, regressions and zero-item
/// placeholders
pub struct ProgressForwarder<F> {
    handler: F,
    last: Option<JobProgress>,
}

impl<F> ProgressForwarder<F>
where
    F: FnMut(&JobProgress) + Send,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            last: None,
        }
    }

    pub fn forward(&mut self, progress: &JobProgress) {
        if progress.total_items == 0 {
            return;
        }
        if let Some(last) = &self.last {
            let repeated = last.processed_items == progress.processed_items
                && last.total_items == progress.total_items
                && last.current_status == progress.current_status;
            if repeated || last.advance_to(progress).is_err() {
                return;
            }
        }
        (self.handler)(progress);
        self.last = Some(progress.clone());
    }
}

enum ChannelOutcome {
    Terminal(Result<serde_json::Value>),
    Fallback(String),
}

pub struct TransportSelector {
    channel: Arc<dyn LiveChannel>,
    source: Arc<dyn StatusSource>,
    config: SelectorConfig,
}

impl TransportSelector {
    pub fn new(
        channel: Arc<dyn LiveChannel>,
        source: Arc<dyn StatusSource>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            channel,
            source,
            config,
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Follow a job to its terminal state.
    ///
    /// Resolves `Ok(result)` on completion, `JobFailed` verbatim on a
    /// business failure, `Cancelled` once `cancel` fires, and a transport
    /// error only when polling has exhausted its retries too.
    pub async fn track<F>(
        &self,
        identifier: &JobIdentifier,
        handler: F,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value>
    where
        F: FnMut(&JobProgress) + Send,
    {
        let job_id = &identifier.job_id;
        let mut forwarder = ProgressForwarder::new(handler);

        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        match self.follow_channel(job_id, &mut forwarder, &cancel).await {
            ChannelOutcome::Terminal(result) => return result,
            ChannelOutcome::Fallback(reason) => {
                info!(job_id = %job_id, reason = %reason, "Channel abandoned, polling");
            }
        }

        poll_until_terminal(
            self.source.as_ref(),
            job_id,
            &self.config,
            &mut forwarder,
            &cancel,
        )
        .await
    }

    async fn follow_channel<F>(
        &self,
        job_id: &JobId,
        forwarder: &mut ProgressForwarder<F>,
        cancel: &CancellationToken,
    ) -> ChannelOutcome
    where
        F: FnMut(&JobProgress) + Send,
    {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ChannelOutcome::Terminal(Err(ClientError::Cancelled)),
            opened = tokio::time::timeout(self.config.connect_timeout, self.channel.open(job_id)) => opened,
        };

        let mut events = match opened {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => return ChannelOutcome::Fallback(e.to_string()),
            Err(_) => {
                return ChannelOutcome::Fallback(format!(
                    "connect timed out after {:?}",
                    self.config.connect_timeout
                ))
            }
        };
        debug!(job_id = %job_id, "Following job over the live channel");

        // Dropping `events` on return tears the channel down
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ChannelOutcome::Terminal(Err(ClientError::Cancelled)),
                received = tokio::time::timeout(self.config.stall_timeout, events.recv()) => received,
            };

            let message = match received {
                Err(_) => {
                    return ChannelOutcome::Fallback(format!(
                        "channel silent for {:?}",
                        self.config.stall_timeout
                    ))
                }
                Ok(None) => return ChannelOutcome::Fallback("channel ended".to_string()),
                Ok(Some(ChannelEvent::Closed(reason))) => return ChannelOutcome::Fallback(reason),
                Ok(Some(ChannelEvent::Message(message))) => message,
            };

            match message {
                ProgressMessage::ProgressUpdate { progress, .. } => forwarder.forward(&progress),
                ProgressMessage::KeepAlive { .. } => trace!(job_id = %job_id, "keep-alive"),
                ProgressMessage::Completion { result, .. } => {
                    return ChannelOutcome::Terminal(Ok(result))
                }
                ProgressMessage::Error { failure, .. } => {
                    return ChannelOutcome::Terminal(Err(ClientError::JobFailed(failure)))
                }
                ProgressMessage::Cancelled { .. } => {
                    return ChannelOutcome::Terminal(Err(ClientError::Cancelled))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mocks::{ChannelScript, ScriptedChannel, ScriptedStatusSource};
    use serde_json::json;
    use shelfwise_core::domain::{
        JobFailure, JobStatus, JobStatusResponse, JobType,
    };
    use std::sync::Mutex;

    fn identifier() -> JobIdentifier {
        JobIdentifier::new("j1", JobType::BookshelfScan, 0)
    }

    fn update(processed: u32, total: u32) -> ChannelEvent {
        ChannelEvent::Message(ProgressMessage::ProgressUpdate {
            job_id: JobId::new("j1"),
            progress: JobProgress::new(total, processed, "Analyzing").unwrap(),
        })
    }

    fn keep_alive() -> ChannelEvent {
        ChannelEvent::Message(ProgressMessage::KeepAlive {
            job_id: JobId::new("j1"),
        })
    }

    fn completion(result: serde_json::Value) -> ChannelEvent {
        ChannelEvent::Message(ProgressMessage::Completion {
            job_id: JobId::new("j1"),
            result,
        })
    }

    fn polled(status: JobStatus) -> Result<JobStatusResponse> {
        Ok(JobStatusResponse::new(&identifier(), &status, 0))
    }

    fn at(ms: u64, event: ChannelEvent) -> (Duration, ChannelEvent) {
        (Duration::from_millis(ms), event)
    }

    struct Harness {
        channel: Arc<ScriptedChannel>,
        source: Arc<ScriptedStatusSource>,
        selector: TransportSelector,
    }

    fn harness(script: ChannelScript, polls: Vec<Result<JobStatusResponse>>) -> Harness {
        let channel = Arc::new(ScriptedChannel::new(script));
        let source = Arc::new(ScriptedStatusSource::new(polls));
        let selector =
            TransportSelector::new(channel.clone(), source.clone(), SelectorConfig::default());
        Harness {
            channel,
            source,
            selector,
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl FnMut(&JobProgress) + Send) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |p: &JobProgress| {
            sink.lock().unwrap().push(p.processed_items)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_progress_then_completion() {
        let mut events: Vec<_> = (1..=13).map(|i| at(100, update(i, 13))).collect();
        events.push(at(100, completion(json!({"books": 13}))));
        let h = harness(
            ChannelScript::Events {
                events,
                hold_open: true,
            },
            vec![],
        );
        let (seen, handler) = recorder();

        let result = h
            .selector
            .track(&identifier(), handler, CancellationToken::new())
            .await;

        assert_eq!(result, Ok(json!({"books": 13})));
        assert_eq!(*seen.lock().unwrap(), (1..=13).collect::<Vec<_>>());
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_never_reaches_handler() {
        let h = harness(
            ChannelScript::Events {
                events: vec![
                    at(10, keep_alive()),
                    at(10, update(1, 2)),
                    at(10, keep_alive()),
                    at(10, keep_alive()),
                    at(10, completion(json!(null))),
                ],
                hold_open: true,
            },
            vec![],
        );
        let (seen, handler) = recorder();

        h.selector
            .track(&identifier(), handler, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alives_hold_off_stall_fallback() {
        // 60s of heartbeats every 15s: longer than the stall timeout overall
        let mut events: Vec<_> = (0..4).map(|_| at(15_000, keep_alive())).collect();
        events.push(at(15_000, completion(json!("ok"))));
        let h = harness(
            ChannelScript::Events {
                events,
                hold_open: true,
            },
            vec![],
        );

        let result = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, CancellationToken::new())
            .await;

        assert_eq!(result, Ok(json!("ok")));
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_channel_falls_back_to_polling() {
        let h = harness(
            ChannelScript::Refuse(ClientError::Connection("refused".into())),
            vec![
                polled(JobStatus::Active(JobProgress::new(4, 2, "Analyzing").unwrap())),
                polled(JobStatus::Completed(json!({"books": 4}))),
            ],
        );
        let (seen, handler) = recorder();

        let result = h
            .selector
            .track(&identifier(), handler, CancellationToken::new())
            .await;

        assert_eq!(result, Ok(json!({"books": 4})));
        assert_eq!(*seen.lock().unwrap(), vec![2]);
        assert_eq!(h.channel.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_falls_back() {
        let h = harness(
            ChannelScript::Hang,
            vec![polled(JobStatus::Completed(json!("late")))],
        );

        let result = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, CancellationToken::new())
            .await;
        assert_eq!(result, Ok(json!("late")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_falls_back_and_keeps_dedupe_state() {
        let h = harness(
            ChannelScript::Events {
                events: vec![at(10, update(1, 3)), at(10, update(2, 3))],
                hold_open: true,
            },
            vec![
                polled(JobStatus::Active(JobProgress::new(3, 2, "Analyzing").unwrap())),
                polled(JobStatus::Active(JobProgress::new(3, 3, "Analyzing").unwrap())),
                polled(JobStatus::Completed(json!({"books": 3}))),
            ],
        );
        let (seen, handler) = recorder();

        let started = tokio::time::Instant::now();
        let result = h
            .selector
            .track(&identifier(), handler, CancellationToken::new())
            .await;

        assert_eq!(result, Ok(json!({"books": 3})));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(started.elapsed() >= Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_stream_falls_back() {
        let h = harness(
            ChannelScript::Events {
                events: vec![
                    at(10, update(1, 2)),
                    at(10, ChannelEvent::Closed("connection reset".into())),
                ],
                hold_open: false,
            },
            vec![polled(JobStatus::Completed(json!("done")))],
        );

        let result = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, CancellationToken::new())
            .await;
        assert_eq!(result, Ok(json!("done")));
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_over_channel_is_verbatim() {
        let failure = JobFailure::new("image unreadable");
        let h = harness(
            ChannelScript::Events {
                events: vec![at(
                    10,
                    ChannelEvent::Message(ProgressMessage::Error {
                        job_id: JobId::new("j1"),
                        failure: failure.clone(),
                    }),
                )],
                hold_open: true,
            },
            vec![],
        );

        let result = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, CancellationToken::new())
            .await;
        assert_eq!(result, Err(ClientError::JobFailed(failure)));
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_over_channel_matches_polling() {
        let h = harness(
            ChannelScript::Events {
                events: vec![at(
                    10,
                    ChannelEvent::Message(ProgressMessage::Cancelled {
                        job_id: JobId::new("j1"),
                    }),
                )],
                hold_open: true,
            },
            vec![],
        );
        let over_channel = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, CancellationToken::new())
            .await;
        assert_eq!(over_channel, Err(ClientError::Cancelled));
        assert_eq!(h.source.calls(), 0);

        let h = harness(ChannelScript::Refuse(ClientError::Connection("refused".into())), vec![polled(JobStatus::Cancelled)]);
        let over_polling = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, CancellationToken::new())
            .await;
        assert_eq!(over_polling, Err(ClientError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_on_channel() {
        let h = harness(
            ChannelScript::Events {
                events: vec![at(10, update(1, 5))],
                hold_open: true,
            },
            vec![],
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, cancel)
            .await;

        assert_eq!(result, Err(ClientError::Cancelled));
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_makes_no_contact() {
        let h = harness(ChannelScript::Hang, vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h
            .selector
            .track(&identifier(), |_: &JobProgress| {}, cancel)
            .await;

        assert_eq!(result, Err(ClientError::Cancelled));
        assert_eq!(h.channel.opens(), 0);
        assert_eq!(h.source.calls(), 0);
    }

    #[test]
    fn test_forwarder_drops_repeats_regressions_and_placeholders() {
        let (seen, handler) = recorder();
        let mut forwarder = ProgressForwarder::new(handler);

        forwarder.forward(&JobProgress::starting("Starting analysis"));
        forwarder.forward(&JobProgress::new(5, 1, "Analyzing").unwrap());
        forwarder.forward(&JobProgress::new(5, 1, "Analyzing").unwrap());
        forwarder.forward(&JobProgress::new(5, 3, "Analyzing").unwrap());
        forwarder.forward(&JobProgress::new(5, 2, "Analyzing").unwrap());
        forwarder.forward(&JobProgress::new(5, 3, "Matching").unwrap());

        assert_eq!(*seen.lock().unwrap(), vec![1, 3, 3]);
    }
}
