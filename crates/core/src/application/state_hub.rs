//! Per-job durable state plus live fan-out.
//!
//! The hub owns the `JobStateStore` and one broadcast sender per watched job.
//! Exactly one `JobStateWriter` exists per job (created by `create`), so the
//! state has a single writer; any number of readers take snapshots or
//! subscribe.

use crate::application::constants::LOST_INVOCATION_MESSAGE;
use crate::domain::{
    DurableJobState, JobFailure, JobId, JobIdentifier, JobProgress, JobStatus, ProgressMessage,
    RetentionConfig,
};
use crate::error::Result;
use crate::port::{JobStateStore, ProgressReport, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 64;

pub struct JobStateHub {
    store: Arc<dyn JobStateStore>,
    time_provider: Arc<dyn TimeProvider>,
    retention: RetentionConfig,
    stale_after_ms: i64,
    channels: Mutex<HashMap<JobId, broadcast::Sender<ProgressMessage>>>,
}

impl JobStateHub {
    /// `stale_after`: a non-terminal job without writes or heartbeats for this
    /// long reads as failed
    pub fn new(
        store: Arc<dyn JobStateStore>,
        time_provider: Arc<dyn TimeProvider>,
        retention: RetentionConfig,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            time_provider,
            retention,
            stale_after_ms: stale_after.as_millis() as i64,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStateStore> {
        &self.store
    }

    pub fn now(&self) -> i64 {
        self.time_provider.now_millis()
    }

    /// Create the durable state of a new job and hand out its only writer.
    ///
    /// Fails with `AppError::Conflict` when the id already has live state.
    pub async fn create(self: &Arc<Self>, identifier: JobIdentifier) -> Result<JobStateWriter> {
        let now = self.now();
        let state = DurableJobState::new(identifier, now, &self.retention);
        self.store.insert(&state).await?;

        info!(
            job_id = %state.identifier.job_id,
            job_type = %state.identifier.job_type,
            "Job state created"
        );

        Ok(JobStateWriter {
            hub: Arc::clone(self),
            state,
            started: Instant::now(),
        })
    }

    /// Current state as seen by readers.
    ///
    /// Expired states read as absent. A non-terminal state whose invocation
    /// stopped heartbeating reads as `Failed`.
    pub async fn snapshot(&self, job_id: &JobId) -> Result<Option<DurableJobState>> {
        let now = self.now();
        let Some(mut state) = self.store.find(job_id, now).await? else {
            return Ok(None);
        };

        if state.is_stale(now, self.stale_after_ms) {
            debug!(job_id = %job_id, "Job state is stale, reporting invocation lost");
            state.status = JobStatus::Failed(state.lost_failure(LOST_INVOCATION_MESSAGE));
        }
        Ok(Some(state))
    }

    /// Subscribe to live messages of a job. Works before the job exists.
    pub fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<ProgressMessage> {
        let mut channels = self.lock_channels();
        channels
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop the channel of a job once nobody listens anymore
    pub fn prune(&self, job_id: &JobId) {
        let mut channels = self.lock_channels();
        if let Some(tx) = channels.get(job_id) {
            if tx.receiver_count() == 0 {
                channels.remove(job_id);
            }
        }
    }

    pub fn watched_jobs(&self) -> usize {
        self.lock_channels().len()
    }

    fn publish(&self, message: ProgressMessage) {
        let channels = self.lock_channels();
        if let Some(tx) = channels.get(message.job_id()) {
            // No receivers is fine: readers fall back to snapshots
            let _ = tx.send(message);
        }
    }

    /// Remove the channel after the terminal message; receivers drain what is
    /// buffered and then observe `Closed`
    fn close(&self, job_id: &JobId) {
        self.lock_channels().remove(job_id);
    }

    fn lock_channels(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, broadcast::Sender<ProgressMessage>>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Sole writer of one job's durable state
pub struct JobStateWriter {
    hub: Arc<JobStateHub>,
    state: DurableJobState,
    started: Instant,
}

impl JobStateWriter {
    pub fn job_id(&self) -> &JobId {
        &self.state.identifier.job_id
    }

    pub fn identifier(&self) -> &JobIdentifier {
        &self.state.identifier
    }

    pub fn state(&self) -> &DurableJobState {
        &self.state
    }

    pub fn last_progress(&self) -> Option<&JobProgress> {
        self.state.last_progress.as_ref()
    }

    /// `Queued -> Active` with zero items
    pub async fn activate(&mut self, status: &str) -> Result<()> {
        self.write(JobStatus::Active(JobProgress::starting(status)))
            .await
    }

    /// Record engine progress, computing the ETA from observed throughput
    pub async fn progress(&mut self, report: &ProgressReport) -> Result<()> {
        let eta = estimate_remaining(self.started.elapsed(), report.processed, report.total);
        let progress =
            JobProgress::new(report.total, report.processed, report.status.clone())?.with_eta(eta);
        self.write(JobStatus::Active(progress)).await
    }

    /// Liveness only: touches the heartbeat timestamp and pushes a keep-alive
    pub async fn heartbeat(&mut self) -> Result<()> {
        self.state.record_heartbeat(self.hub.now());
        self.hub.store.save(&self.state).await?;
        self.hub.publish(ProgressMessage::KeepAlive {
            job_id: self.job_id().clone(),
        });
        Ok(())
    }

    pub async fn complete(self, result: serde_json::Value) -> Result<JobStatus> {
        self.finish(JobStatus::Completed(result)).await
    }

    pub async fn fail(self, failure: JobFailure) -> Result<JobStatus> {
        self.finish(JobStatus::Failed(failure)).await
    }

    async fn finish(mut self, status: JobStatus) -> Result<JobStatus> {
        let outcome = self.write(status).await;
        self.hub.close(self.job_id());
        outcome?;

        info!(
            job_id = %self.job_id(),
            status = %self.state.status.kind(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Job finished"
        );
        Ok(self.state.status)
    }

    async fn write(&mut self, next: JobStatus) -> Result<()> {
        let now = self.hub.now();
        let mut updated = self.state.clone();
        updated.apply(next, now, &self.hub.retention)?;
        self.hub.store.save(&updated).await?;
        self.state = updated;

        if let Some(message) = self.state.to_message() {
            self.hub.publish(message);
        }
        Ok(())
    }
}

/// Remaining seconds extrapolated from the average time per processed item
fn estimate_remaining(elapsed: Duration, processed: u32, total: u32) -> Option<u64> {
    if processed == 0 || total < processed {
        return None;
    }
    let per_item = elapsed.as_secs_f64() / processed as f64;
    Some((per_item * (total - processed) as f64).ceil() as u64)
}
