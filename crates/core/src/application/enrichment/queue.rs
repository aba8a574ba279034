//! Durable, deduplicating FIFO of record references awaiting enrichment.
//!
//! Every mutation is applied to a copy, persisted through `QueuePersistence`,
//! and only then published in memory: after a failed save the queue is
//! unchanged.

use crate::domain::{QueueItem, RecordRef};
use crate::error::Result;
use crate::port::{QueuePersistence, TimeProvider};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct EnrichmentQueue {
    items: Mutex<VecDeque<QueueItem>>,
    persistence: Arc<dyn QueuePersistence>,
    time_provider: Arc<dyn TimeProvider>,
    namespace: String,
}

impl EnrichmentQueue {
    /// Restore the queue from its persisted snapshot
    pub async fn load(
        persistence: Arc<dyn QueuePersistence>,
        time_provider: Arc<dyn TimeProvider>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let saved = persistence.load(&namespace).await?;

        let mut items: VecDeque<QueueItem> = VecDeque::with_capacity(saved.len());
        for item in saved {
            if !items.iter().any(|i| i.record_ref == item.record_ref) {
                items.push_back(item);
            }
        }

        info!(namespace = %namespace, restored = items.len(), "Enrichment queue loaded");

        Ok(Self {
            items: Mutex::new(items),
            persistence,
            time_provider,
            namespace,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Append a reference. Returns false (and writes nothing) if already queued.
    pub async fn enqueue(&self, record_ref: RecordRef) -> Result<bool> {
        Ok(self.enqueue_batch(vec![record_ref]).await? == 1)
    }

    /// Append references in order, skipping those already queued.
    /// One persisted write for the whole batch. Returns the number added.
    pub async fn enqueue_batch(&self, refs: Vec<RecordRef>) -> Result<usize> {
        let now = self.time_provider.now_millis();
        let mut items = self.items.lock().await;

        let mut next = items.clone();
        let mut added = 0;
        for record_ref in refs {
            if !next.iter().any(|i| i.record_ref == record_ref) {
                next.push_back(QueueItem::new(record_ref, now));
                added += 1;
            }
        }
        if added == 0 {
            return Ok(0);
        }

        self.commit(&mut items, next).await?;
        debug!(added, queued = items.len(), "Enqueued records for enrichment");
        Ok(added)
    }

    /// Move a reference to the front, inserting it if absent
    pub async fn prioritize(&self, record_ref: RecordRef) -> Result<()> {
        let mut items = self.items.lock().await;

        if items.front().map(|i| &i.record_ref) == Some(&record_ref) {
            return Ok(());
        }

        let mut next = items.clone();
        let item = match next.iter().position(|i| i.record_ref == record_ref) {
            Some(index) => next.remove(index),
            None => None,
        }
        .unwrap_or_else(|| QueueItem::new(record_ref, self.time_provider.now_millis()));
        next.push_front(item);

        self.commit(&mut items, next).await
    }

    /// Remove and return the front item
    pub async fn pop(&self) -> Result<Option<QueueItem>> {
        let mut items = self.items.lock().await;
        if items.is_empty() {
            return Ok(None);
        }

        let mut next = items.clone();
        let front = next.pop_front();
        self.commit(&mut items, next).await?;
        Ok(front)
    }

    /// Front item without removing it
    pub async fn next(&self) -> Option<QueueItem> {
        self.items.lock().await.front().cloned()
    }

    /// Drop every item, returning how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let mut items = self.items.lock().await;
        let removed = items.len();
        if removed == 0 {
            return Ok(0);
        }
        self.commit(&mut items, VecDeque::new()).await?;
        info!(removed, "Enrichment queue cleared");
        Ok(removed)
    }

    pub async fn count(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn contains(&self, record_ref: &RecordRef) -> bool {
        self.items
            .lock()
            .await
            .iter()
            .any(|i| &i.record_ref == record_ref)
    }

    /// Items in processing order
    pub async fn items(&self) -> Vec<QueueItem> {
        self.items.lock().await.iter().cloned().collect()
    }

    async fn commit(&self, items: &mut VecDeque<QueueItem>, next: VecDeque<QueueItem>) -> Result<()> {
        let snapshot: Vec<QueueItem> = next.iter().cloned().collect();
        self.persistence.save(&self.namespace, &snapshot).await?;
        *items = next;
        Ok(())
    }
}
