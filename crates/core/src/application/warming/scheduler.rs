// Warming scheduler: periodic runs with an at-most-one-run guard

use crate::application::warming::processor::{WarmingProcessor, WarmingReport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct WarmingScheduler {
    processor: Arc<WarmingProcessor>,
    interval: Duration,
    run_lock: tokio::sync::Mutex<()>,
    last_report: Mutex<Option<WarmingReport>>,
}

impl WarmingScheduler {
    pub fn new(processor: Arc<WarmingProcessor>, interval: Duration) -> Self {
        Self {
            processor,
            interval,
            run_lock: tokio::sync::Mutex::new(()),
            last_report: Mutex::new(None),
        }
    }

    pub fn processor(&self) -> &Arc<WarmingProcessor> {
        &self.processor
    }

    /// Run one batch now. `None` when a run is already in progress.
    pub async fn try_run(&self) -> Option<WarmingReport> {
        let _guard = self.run_lock.try_lock().ok()?;
        let report = self.processor.run_once().await;

        let mut last = match self.last_report.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = Some(report.clone());
        Some(report)
    }

    pub fn last_report(&self) -> Option<WarmingReport> {
        match self.last_report.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Schedule loop (background task). The schedule never terminates on its
    /// own; it stops when `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Warming scheduler started");

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.try_run().await.is_none() {
                        debug!("Warming run already in progress, skipping tick");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Warming scheduler stopped");
    }
}
