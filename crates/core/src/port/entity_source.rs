// Entity Source Port (the list walked by the warming processor)

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Entity names in processing order
    async fn load_entities(&self) -> Result<Vec<String>>;

    /// Replace the whole list, returning its new length
    async fn replace_entities(&self, names: &[String]) -> Result<usize>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryEntitySource {
        names: Mutex<Vec<String>>,
    }

    impl InMemoryEntitySource {
        pub fn new(names: Vec<String>) -> Self {
            Self {
                names: Mutex::new(names),
            }
        }

        /// `Author 0`, `Author 1`, ...
        pub fn numbered(count: usize) -> Self {
            Self::new((0..count).map(|i| format!("Author {}", i)).collect())
        }
    }

    #[async_trait]
    impl EntitySource for InMemoryEntitySource {
        async fn load_entities(&self) -> Result<Vec<String>> {
            Ok(self.names.lock().unwrap().clone())
        }

        async fn replace_entities(&self, names: &[String]) -> Result<usize> {
            let mut list = self.names.lock().unwrap();
            *list = names.to_vec();
            Ok(list.len())
        }
    }
}
