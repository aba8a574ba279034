// Batch Cursor for the recurring warming job

use serde::{Deserialize, Serialize};

/// Persisted resume point of a recurring bulk job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCursor {
    pub current_index: u64,
    pub total_count: u64,
    pub started_at: i64, // epoch ms of the current cycle
}

impl BatchCursor {
    pub fn new(total_count: u64, started_at: i64) -> Self {
        Self {
            current_index: 0,
            total_count,
            started_at,
        }
    }

    /// A cycle is complete once the index reaches the list size
    pub fn is_cycle_complete(&self) -> bool {
        self.current_index >= self.total_count
    }

    /// Cursor to use for the next run over a list of `len` entities.
    ///
    /// Resets to 0 with a fresh `started_at` when the previous cycle finished
    /// or the list shrank below the saved index.
    pub fn resume(saved: Option<BatchCursor>, len: u64, now: i64) -> BatchCursor {
        match saved {
            Some(cursor) if cursor.current_index < len && !cursor.is_cycle_complete() => {
                BatchCursor {
                    total_count: len,
                    ..cursor
                }
            }
            _ => BatchCursor::new(len, now),
        }
    }

    /// Half-open slice `[start, end)` for a batch of `batch_size`
    pub fn batch_range(&self, batch_size: u64) -> (u64, u64) {
        let start = self.current_index.min(self.total_count);
        let end = start.saturating_add(batch_size).min(self.total_count);
        (start, end)
    }

    pub fn advance_to(&mut self, index: u64) {
        self.current_index = index;
    }
}
