// Batch Cursor Store Port

use crate::domain::BatchCursor;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<BatchCursor>>;

    async fn save(&self, name: &str, cursor: &BatchCursor) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryCursorStore {
        cursors: Mutex<HashMap<String, BatchCursor>>,
        fail_loads: AtomicBool,
    }

    impl InMemoryCursorStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, name: &str) -> Option<BatchCursor> {
            self.cursors.lock().unwrap().get(name).copied()
        }

        pub fn set_fail_loads(&self, fail: bool) {
            self.fail_loads.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CursorStore for InMemoryCursorStore {
        async fn load(&self, name: &str) -> Result<Option<BatchCursor>> {
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(AppError::Database("cursor table locked".to_string()));
            }
            Ok(self.get(name))
        }

        async fn save(&self, name: &str, cursor: &BatchCursor) -> Result<()> {
            self.cursors
                .lock()
                .unwrap()
                .insert(name.to_string(), *cursor);
            Ok(())
        }
    }
}
