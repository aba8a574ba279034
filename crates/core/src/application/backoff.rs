// Exponential backoff with deterministic jitter
use std::time::Duration;

/// Backoff policy for transport-level retries.
///
/// delay = base_delay * factor^attempt * (1.0 ± 0.1), capped at `max_delay`.
/// The jitter is derived from a seed (usually the job id), so one job always
/// sees the same schedule while different jobs spread out.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn new(base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            factor,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32, seed: &str) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64 * self.factor.powi(attempt as i32);

        let jitter_seed = seed.chars().map(|c| c as u32).fold(0u32, u32::wrapping_add);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (base_ms * jitter_factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let backoff = Backoff::default();
        let d0 = backoff.delay(0, "job-1");
        let d1 = backoff.delay(1, "job-1");
        let d2 = backoff.delay(2, "job-1");
        assert!(d1 > d0);
        assert!(d2 > d1);
        assert!(d0 >= Duration::from_millis(900) && d0 <= Duration::from_millis(1100));
    }

    #[test]
    fn test_jitter_is_deterministic_per_seed() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(3, "abc"), backoff.delay(3, "abc"));
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = Backoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(5));
        assert_eq!(backoff.delay(10, "x"), Duration::from_secs(5));
    }
}
