// Enrichment Worker - singleton consumer of the enrichment queue

use crate::application::constants::DEFAULT_ITEM_TIMEOUT;
use crate::application::enrichment::queue::EnrichmentQueue;
use crate::application::rate_gate::RateGate;
use crate::domain::QueueItem;
use crate::port::EnrichmentProvider;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub item_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            item_timeout: DEFAULT_ITEM_TIMEOUT,
        }
    }
}

/// Observable worker statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub remaining: usize,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct EnrichmentWorker {
    queue: Arc<EnrichmentQueue>,
    provider: Arc<dyn EnrichmentProvider>,
    rate_gate: Arc<RateGate>,
    config: WorkerConfig,
    shutdown: CancellationToken,
    running: AtomicBool,
    stats: watch::Sender<EnrichmentStats>,
}

impl EnrichmentWorker {
    pub fn new(
        queue: Arc<EnrichmentQueue>,
        provider: Arc<dyn EnrichmentProvider>,
        rate_gate: Arc<RateGate>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (stats, _) = watch::channel(EnrichmentStats::default());
        Self {
            queue,
            provider,
            rate_gate,
            config,
            shutdown,
            running: AtomicBool::new(false),
            stats,
        }
    }

    pub fn queue(&self) -> &Arc<EnrichmentQueue> {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EnrichmentStats {
        self.stats.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EnrichmentStats> {
        self.stats.subscribe()
    }

    /// Spawn the consumer loop unless one is already running.
    ///
    /// Returns false when a loop is already active.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.stats.send_modify(|s| s.running = true);
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run().await });
        true
    }

    async fn run(self: Arc<Self>) {
        let _guard = RunningGuard(&self.running);
        let queued = self.queue.count().await;
        info!(queued, "Enrichment worker started");

        loop {
            self.drain().await;

            // Release the flag, then re-check so a late enqueue is not stranded
            self.running.store(false, Ordering::SeqCst);
            if self.shutdown.is_cancelled() || self.queue.is_empty().await {
                break;
            }
            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // Another loop took over
                return;
            }
        }

        let remaining = self.queue.count().await;
        // A concurrent start() may already own the flag again
        let running = self.running.load(Ordering::SeqCst);
        self.stats.send_modify(|s| {
            s.running = running;
            s.remaining = remaining;
        });
        info!(stats = ?self.stats(), "Enrichment worker stopped");
    }

    async fn drain(&self) {
        while !self.shutdown.is_cancelled() {
            let item = match self.queue.pop().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to pop enrichment queue");
                    break;
                }
            };

            tokio::select! {
                _ = self.rate_gate.acquire() => {}
                _ = self.shutdown.cancelled() => {
                    // Put it back for the next start
                    if let Err(e) = self.queue.prioritize(item.record_ref.clone()).await {
                        warn!(record_ref = %item.record_ref, error = %e, "Failed to requeue item");
                    }
                    break;
                }
            }

            let outcome = self.enrich_isolated(&item).await;
            let remaining = self.queue.count().await;
            self.stats.send_modify(|s| {
                s.processed += 1;
                s.remaining = remaining;
                match &outcome {
                    Ok(()) => s.succeeded += 1,
                    Err(message) => {
                        s.failed += 1;
                        s.last_error = Some(message.clone());
                    }
                }
            });
        }
    }

    /// Run one provider call in its own task, under the item timeout.
    /// A panic or timeout is a failed item, never a dead worker.
    async fn enrich_isolated(&self, item: &QueueItem) -> Result<(), String> {
        let provider = Arc::clone(&self.provider);
        let record_ref = item.record_ref.clone();
        let item_timeout = self.config.item_timeout;

        let handle = tokio::spawn(async move {
            tokio::time::timeout(item_timeout, provider.enrich(&record_ref)).await
        });

        let message = match handle.await {
            Ok(Ok(Ok(()))) => {
                info!(record_ref = %item.record_ref, "Record enriched");
                return Ok(());
            }
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(_)) => format!("timed out after {}s", item_timeout.as_secs()),
            Err(join_err) if join_err.is_panic() => "enrichment panicked".to_string(),
            Err(join_err) => format!("enrichment cancelled: {}", join_err),
        };

        warn!(record_ref = %item.record_ref, error = %message, "Enrichment failed, dropping item");
        Err(message)
    }
}

/// Clears the running flag if the loop unwinds
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.store(false, Ordering::SeqCst);
        }
    }
}
