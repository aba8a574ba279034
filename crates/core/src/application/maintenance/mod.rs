// Maintenance Service
// Scheduled purge of expired job states and cache entries

use crate::error::Result;
use crate::port::{Maintenance, MaintenanceConfig, MaintenanceReport, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs periodic maintenance in the background
pub struct MaintenanceScheduler {
    maintenance: Arc<dyn Maintenance>,
    time_provider: Arc<dyn TimeProvider>,
    config: MaintenanceConfig,
    interval: Duration,
}

impl MaintenanceScheduler {
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        time_provider: Arc<dyn TimeProvider>,
        config: MaintenanceConfig,
        interval: Duration,
    ) -> Self {
        Self {
            maintenance,
            time_provider,
            config,
            interval,
        }
    }

    /// Maintenance loop (background task), stops on `shutdown`
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            max_db_size_mb = self.config.max_db_size_mb,
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            match self.run_now().await {
                Ok(report) => {
                    info!(
                        purged_states = report.purged_states,
                        purged_cache_entries = report.purged_cache_entries,
                        db_size_mb = report.stats.db_size_mb,
                        "Scheduled maintenance completed successfully"
                    );
                }
                Err(e) => {
                    error!(error = ?e, "Scheduled maintenance failed");
                }
            }
        }

        info!("Maintenance scheduler stopped");
    }

    /// Run maintenance immediately (manual trigger)
    pub async fn run_now(&self) -> Result<MaintenanceReport> {
        let now = self.time_provider.now_millis();
        self.maintenance
            .run_full_maintenance(&self.config, now)
            .await
    }
}
