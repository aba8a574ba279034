// Application constants (no magic values)
use std::time::Duration;

/// Namespace of the persisted enrichment queue snapshot
pub const ENRICHMENT_QUEUE_NAMESPACE: &str = "enrichment-queue.v1";

/// Cursor name used by the author warming job
pub const WARMING_CURSOR_NAME: &str = "author-warming";

/// Heartbeat period while a job is active (15s)
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Invocation idle budget: cancelled after this long without a touch (30s)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Invocation total budget (300s)
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(300);

/// Minimum spacing of outbound provider calls (1s)
pub const PROVIDER_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Per-item enrichment timeout (30s)
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// Warming schedule period (5 minutes)
pub const DEFAULT_WARMING_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Entities per warming run
pub const DEFAULT_WARMING_BATCH_SIZE: usize = 25;

/// TTL of warmed cache entries (7 days)
pub const DEFAULT_CACHE_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// TTL of on-demand search cache entries (1 day)
pub const SEARCH_CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Maintenance pass period (1 hour)
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Failure message for a job whose serving invocation disappeared
pub const LOST_INVOCATION_MESSAGE: &str = "job invocation lost";

/// Failure message written by crash recovery
pub const RESTART_INTERRUPTED_MESSAGE: &str = "interrupted by restart";
