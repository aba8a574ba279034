//! Invocation budget of one inbound request.
//!
//! The host cancels an invocation that stays idle (no touch) for
//! `idle_timeout`, or that runs longer than `max_duration`. Heartbeats touch
//! the context to keep a long analysis alive.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep_until, Instant};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("invocation idle for more than {}s", .0.as_secs())]
    IdleTimeout(Duration),

    #[error("invocation exceeded its {}s budget", .0.as_secs())]
    BudgetExceeded(Duration),
}

pub struct InvocationContext {
    idle_timeout: Duration,
    max_duration: Duration,
    started_at: Instant,
    last_touch: Mutex<Instant>,
}

impl InvocationContext {
    pub fn new(idle_timeout: Duration, max_duration: Duration) -> Self {
        let now = Instant::now();
        Self {
            idle_timeout,
            max_duration,
            started_at: now,
            last_touch: Mutex::new(now),
        }
    }

    /// Record activity, resetting the idle watchdog
    pub fn touch(&self) {
        let mut last = match self.last_touch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = Instant::now();
    }

    fn last_touch(&self) -> Instant {
        match self.last_touch.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Drive `fut` under the idle and total budgets
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, InvocationError> {
        tokio::pin!(fut);
        let deadline = self.started_at + self.max_duration;

        loop {
            let idle_deadline = self.last_touch() + self.idle_timeout;

            tokio::select! {
                biased;
                output = &mut fut => return Ok(output),
                _ = sleep_until(deadline) => {
                    return Err(InvocationError::BudgetExceeded(self.max_duration));
                }
                _ = sleep_until(idle_deadline) => {
                    // Touched while sleeping: re-arm with the new deadline
                    if self.last_touch() + self.idle_timeout <= Instant::now() {
                        return Err(InvocationError::IdleTimeout(self.idle_timeout));
                    }
                }
            }
        }
    }
}
