//! Transport seams used by the selector: a live push channel and a status
//! source for polling. `WebSocketChannel` and `JobClient` are the real ones.

use crate::error::Result;
use async_trait::async_trait;
use shelfwise_core::domain::{JobId, JobStatusResponse, ProgressMessage};
use tokio::sync::mpsc;

/// Event delivered by an open live channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(ProgressMessage),
    /// Disconnect or undecodable frame. Nothing follows it.
    Closed(String),
}

#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Connect, announce readiness, and stream events until closed.
    /// Dropping the receiver tears the connection down.
    async fn open(&self, job_id: &JobId) -> Result<mpsc::Receiver<ChannelEvent>>;
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatusResponse>;
}

pub mod mocks {
    use super::*;
    use crate::error::ClientError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub enum ChannelScript {
        /// `open` fails immediately
        Refuse(ClientError),
        /// `open` never completes
        Hang,
        /// Deliver each event after its delay; then close, or stay silent
        /// while the receiver lives when `hold_open` is set
        Events {
            events: Vec<(Duration, ChannelEvent)>,
            hold_open: bool,
        },
    }

    pub struct ScriptedChannel {
        script: Mutex<Option<ChannelScript>>,
        opens: AtomicUsize,
    }

    impl ScriptedChannel {
        pub fn new(script: ChannelScript) -> Self {
            Self {
                script: Mutex::new(Some(script)),
                opens: AtomicUsize::new(0),
            }
        }

        pub fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LiveChannel for ScriptedChannel {
        async fn open(&self, _job_id: &JobId) -> Result<mpsc::Receiver<ChannelEvent>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().unwrap().take();
            match script {
                None => Err(ClientError::Connection("channel already used".to_string())),
                Some(ChannelScript::Refuse(e)) => Err(e),
                Some(ChannelScript::Hang) => std::future::pending().await,
                Some(ChannelScript::Events { events, hold_open }) => {
                    let (tx, rx) = mpsc::channel(16);
                    tokio::spawn(async move {
                        for (delay, event) in events {
                            tokio::time::sleep(delay).await;
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        if hold_open {
                            tx.closed().await;
                        }
                    });
                    Ok(rx)
                }
            }
        }
    }

    /// Answers polls from a script; the last answer repeats once exhausted
    pub struct ScriptedStatusSource {
        answers: Mutex<VecDeque<Result<JobStatusResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedStatusSource {
        pub fn new(answers: Vec<Result<JobStatusResponse>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedStatusSource {
        async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatusResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            match answers.len() {
                0 => Err(ClientError::NotFound(job_id.to_string())),
                1 => answers[0].clone(),
                _ => answers.pop_front().unwrap_or_else(|| Err(ClientError::NotFound(job_id.to_string()))),
            }
        }
    }
}
