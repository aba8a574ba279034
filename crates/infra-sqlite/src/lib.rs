// Shelfwise Infrastructure - SQLite Adapter
// Implements: JobStateStore, QueuePersistence, MetadataCache, CursorStore,
// EntitySource, RecordStore, Maintenance

mod connection;
mod cursor_store;
mod entity_source;
mod error;
mod job_state_store;
mod maintenance_impl;
mod metadata_cache;
mod migration;
mod queue_persistence;
mod record_store;

pub use connection::create_pool;
pub use cursor_store::SqliteCursorStore;
pub use entity_source::SqliteEntitySource;
pub use job_state_store::SqliteJobStateStore;
pub use maintenance_impl::SqliteMaintenance;
pub use metadata_cache::SqliteMetadataCache;
pub use migration::run_migrations;
pub use queue_persistence::SqliteQueuePersistence;
pub use record_store::SqliteRecordStore;
