// Storage Maintenance port
use crate::error::Result;
use async_trait::async_trait;

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct MaintenanceStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub job_state_count: i64,
    pub cache_entry_count: i64,
    pub record_count: i64,
    pub queued_refs: i64,
}

/// What one maintenance pass did
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub purged_states: u64,
    pub purged_cache_entries: u64,
    pub reclaimed_mb: f64,
    pub stats: MaintenanceStats,
}

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Maximum DB size before forcing VACUUM (MB)
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            max_db_size_mb: 500.0,
        }
    }
}

/// Storage maintenance operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Run VACUUM, returning the space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    /// Delete job states past their retention
    async fn purge_expired_states(&self, now: i64) -> Result<u64>;

    /// Delete cache entries past their TTL
    async fn purge_expired_cache(&self, now: i64) -> Result<u64>;

    async fn get_stats(&self) -> Result<MaintenanceStats>;

    /// Purge expired data, then VACUUM if the DB is over its size limit
    async fn run_full_maintenance(
        &self,
        config: &MaintenanceConfig,
        now: i64,
    ) -> Result<MaintenanceReport> {
        let purged_states = self.purge_expired_states(now).await?;
        let purged_cache_entries = self.purge_expired_cache(now).await?;

        let before = self.get_stats().await?;
        let reclaimed_mb = if before.db_size_mb > config.max_db_size_mb {
            self.vacuum().await?
        } else {
            0.0
        };

        let stats = self.get_stats().await?;

        tracing::info!(
            purged_states,
            purged_cache_entries,
            reclaimed_mb,
            db_size_mb = stats.db_size_mb,
            "Maintenance completed"
        );

        Ok(MaintenanceReport {
            purged_states,
            purged_cache_entries,
            reclaimed_mb,
            stats,
        })
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts passes; reports a fixed number of purged rows
    #[derive(Default)]
    pub struct MockMaintenance {
        passes: AtomicUsize,
    }

    impl MockMaintenance {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn passes(&self) -> usize {
            self.passes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Maintenance for MockMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            Ok(0.0)
        }

        async fn purge_expired_states(&self, _now: i64) -> Result<u64> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        }

        async fn purge_expired_cache(&self, _now: i64) -> Result<u64> {
            Ok(1)
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            Ok(MaintenanceStats::default())
        }
    }
}
