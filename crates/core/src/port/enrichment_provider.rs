// Enrichment Provider Port

use crate::domain::RecordRef;
use crate::error::Result;
use async_trait::async_trait;

/// Best-effort enhancement of one existing record
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(&self, record_ref: &RecordRef) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock enricher behavior for one reference
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        Success,
        Fail(String),
        /// Panic (for panic isolation testing)
        Panic,
        /// Sleep this long before succeeding
        Hang(Duration),
    }

    /// Records every call; outcome configurable per reference
    pub struct RecordingEnricher {
        calls: Mutex<Vec<RecordRef>>,
        failing: Mutex<HashSet<RecordRef>>,
        default: MockOutcome,
        delay: Duration,
    }

    impl RecordingEnricher {
        pub fn new() -> Self {
            Self::with_default(MockOutcome::Success)
        }

        pub fn with_default(default: MockOutcome) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
                default,
                delay: Duration::ZERO,
            }
        }

        /// Delay applied before every call completes
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn fail_for(self, record_ref: impl Into<RecordRef>) -> Self {
            self.failing.lock().unwrap().insert(record_ref.into());
            self
        }

        pub fn calls(&self) -> Vec<RecordRef> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Default for RecordingEnricher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl EnrichmentProvider for RecordingEnricher {
        async fn enrich(&self, record_ref: &RecordRef) -> Result<()> {
            self.calls.lock().unwrap().push(record_ref.clone());
            tokio::time::sleep(self.delay).await;

            if self.failing.lock().unwrap().contains(record_ref) {
                return Err(AppError::NotFound(format!("no metadata for {}", record_ref)));
            }

            match &self.default {
                MockOutcome::Success => Ok(()),
                MockOutcome::Fail(msg) => Err(AppError::Internal(msg.clone())),
                MockOutcome::Panic => panic!("enricher panicked on {}", record_ref),
                MockOutcome::Hang(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
            }
        }
    }
}
