//! Shared minimum-interval throttle guarding the external provider budget.
//!
//! One `RateGate` is shared (via `Arc`) by the enrichment worker, the warming
//! processor and on-demand search, so together they never exceed one call per
//! `min_interval`. Callers wait; the backpressure is never surfaced as an error.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateGate {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call is allowed, then claim the slot.
    ///
    /// The lock is held across the sleep: concurrent callers are served one
    /// at a time, in lock order.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait_time.as_millis() as u64, "Rate gate: waiting");
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}
