// Queue Persistence Port

use crate::domain::QueueItem;
use crate::error::Result;
use async_trait::async_trait;

/// Durable snapshot storage for the enrichment queue, keyed by namespace
#[async_trait]
pub trait QueuePersistence: Send + Sync {
    /// Load the snapshot (empty when nothing was saved yet)
    async fn load(&self, namespace: &str) -> Result<Vec<QueueItem>>;

    /// Replace the snapshot with `items`, in order
    async fn save(&self, namespace: &str, items: &[QueueItem]) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryQueuePersistence {
        snapshots: Mutex<HashMap<String, Vec<QueueItem>>>,
        saves: AtomicUsize,
        fail_saves: AtomicBool,
    }

    impl InMemoryQueuePersistence {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn snapshot(&self, namespace: &str) -> Vec<QueueItem> {
            self.snapshots
                .lock()
                .unwrap()
                .get(namespace)
                .cloned()
                .unwrap_or_default()
        }

        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }

        pub fn set_fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl QueuePersistence for InMemoryQueuePersistence {
        async fn load(&self, namespace: &str) -> Result<Vec<QueueItem>> {
            Ok(self.snapshot(namespace))
        }

        async fn save(&self, namespace: &str, items: &[QueueItem]) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(AppError::Database("disk full".to_string()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.snapshots
                .lock()
                .unwrap()
                .insert(namespace.to_string(), items.to_vec());
            Ok(())
        }
    }
}
