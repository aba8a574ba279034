//! Daemon configuration, read once from `SHELFWISE_*` environment variables

use shelfwise_core::application::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_IDLE_TIMEOUT, DEFAULT_WARMING_BATCH_SIZE,
    DEFAULT_WARMING_INTERVAL,
};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_DB_PATH: &str = "~/.shelfwise/shelfwise.db";
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8787;
pub const DEFAULT_RPC_PORT: u16 = 9527;
pub const DEFAULT_ANALYZER_URL: &str = "http://127.0.0.1:8790";
pub const DEFAULT_PROVIDER_URL: &str = "http://127.0.0.1:8791";
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 20;
pub const DEFAULT_RATE_LIMIT_RATE: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub db_path: String,
    pub http_host: String,
    pub http_port: u16,
    pub rpc_port: u16,
    pub analyzer_url: String,
    pub provider_url: String,
    pub heartbeat_interval: Duration,
    pub warming_batch: usize,
    pub warming_interval: Duration,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset keys take their default; unparsable values are logged and ignored
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring invalid number, using default");
                    None
                }
            }
        };

        let db_path = lookup("SHELFWISE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        Self {
            db_path: shellexpand::tilde(&db_path).into_owned(),
            http_host: lookup("SHELFWISE_HTTP_HOST").unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            http_port: parsed("SHELFWISE_HTTP_PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(DEFAULT_HTTP_PORT),
            rpc_port: parsed("SHELFWISE_RPC_PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(DEFAULT_RPC_PORT),
            analyzer_url: lookup("SHELFWISE_ANALYZER_URL")
                .unwrap_or_else(|| DEFAULT_ANALYZER_URL.to_string()),
            provider_url: lookup("SHELFWISE_PROVIDER_URL")
                .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            heartbeat_interval: parsed("SHELFWISE_HEARTBEAT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .filter(|interval| {
                    // A quiet job must touch the invocation before idle expiry
                    let fits = *interval < DEFAULT_IDLE_TIMEOUT;
                    if !fits {
                        warn!(
                            heartbeat_secs = interval.as_secs(),
                            idle_timeout_secs = DEFAULT_IDLE_TIMEOUT.as_secs(),
                            "Heartbeat must be shorter than the idle timeout, using default"
                        );
                    }
                    fits
                })
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            warming_batch: parsed("SHELFWISE_WARMING_BATCH")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_WARMING_BATCH_SIZE),
            warming_interval: parsed("SHELFWISE_WARMING_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_WARMING_INTERVAL),
            rate_limit_burst: parsed("SHELFWISE_RATE_LIMIT_BURST")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
            rate_limit_rate: parsed("SHELFWISE_RATE_LIMIT_RATE")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_RATE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> DaemonConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert!(config.db_path.ends_with(".shelfwise/shelfwise.db"));
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.warming_batch, 25);
        assert_eq!(config.warming_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SHELFWISE_DB_PATH", "/tmp/shelf.db"),
            ("SHELFWISE_HTTP_PORT", "9000"),
            ("SHELFWISE_ANALYZER_URL", "http://analyzer:80"),
            ("SHELFWISE_HEARTBEAT_SECS", "5"),
            ("SHELFWISE_WARMING_BATCH", "10"),
            ("SHELFWISE_RATE_LIMIT_BURST", "3"),
        ]);
        assert_eq!(config.db_path, "/tmp/shelf.db");
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.analyzer_url, "http://analyzer:80");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.warming_batch, 10);
        assert_eq!(config.rate_limit_burst, 3);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config(&[
            ("SHELFWISE_HTTP_PORT", "99999"),
            ("SHELFWISE_RPC_PORT", "abc"),
            ("SHELFWISE_HEARTBEAT_SECS", "0"),
        ]);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn test_heartbeat_must_beat_idle_timeout() {
        let at_limit = config(&[("SHELFWISE_HEARTBEAT_SECS", "30")]);
        assert_eq!(at_limit.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);

        let below = config(&[("SHELFWISE_HEARTBEAT_SECS", "29")]);
        assert_eq!(below.heartbeat_interval, Duration::from_secs(29));
    }
}
