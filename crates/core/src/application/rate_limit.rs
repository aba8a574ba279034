//! Inbound rate limiter (token bucket).
//!
//! Guards job submission and the admin surface against request floods.
//! Unlike `RateGate` it never waits: a request without a token is rejected.

use std::sync::Mutex;
use tokio::time::Instant;

/// Token bucket: `max_tokens` burst, refilled at `refill_rate` tokens/second
pub struct TokenBucket {
    state: Mutex<BucketState>,
    max_tokens: u32,
    refill_rate: u32,
}

struct BucketState {
    // Fixed-point tokens (x1000) to keep sub-token refills
    milli_tokens: u64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Allow 100 requests/sec with burst of 200: `TokenBucket::new(200, 100)`
    pub fn new(max_tokens: u32, refill_rate: u32) -> Self {
        Self {
            state: Mutex::new(BucketState {
                milli_tokens: max_tokens as u64 * 1000,
                last_refill: Instant::now(),
            }),
            max_tokens,
            refill_rate,
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_refill).as_millis() as u64;
        let refill = elapsed_ms * self.refill_rate as u64;
        state.milli_tokens = (state.milli_tokens + refill).min(self.max_tokens as u64 * 1000);
        state.last_refill = now;
    }

    /// Consume one token. Returns false when rate limited.
    pub fn try_acquire(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.refill(&mut state);

        if state.milli_tokens >= 1000 {
            state.milli_tokens -= 1000;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn remaining(&self) -> u32 {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.refill(&mut state);
        (state.milli_tokens / 1000) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_allows_burst_then_rejects() {
        let bucket = TokenBucket::new(10, 10);
        for _ in 0..10 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_over_time() {
        let bucket = TokenBucket::new(5, 10);
        for _ in 0..5 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(bucket.remaining(), 2);
        assert!(bucket.try_acquire());
        assert_eq!(bucket.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_is_capped_at_burst() {
        let bucket = TokenBucket::new(3, 10);
        assert!(bucket.try_acquire());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(bucket.remaining(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_never_exceeds_burst() {
        let bucket = Arc::new(TokenBucket::new(100, 50));

        let mut handles = vec![];
        for _ in 0..10 {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| bucket.try_acquire()).count()
            }));
        }

        let mut total_allowed = 0;
        for handle in handles {
            total_allowed += handle.await.unwrap();
        }
        assert_eq!(total_allowed, 100);
    }
}
