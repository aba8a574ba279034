// Bulk metadata warming

pub mod authors;
pub mod keys;
pub mod processor;
pub mod scheduler;

pub use authors::{clean_author_name, extract_authors, AuthorCount};
pub use processor::{WarmingConfig, WarmingProcessor, WarmingReport};
pub use scheduler::WarmingScheduler;
