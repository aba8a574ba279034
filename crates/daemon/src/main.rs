//! Shelfwise Daemon - Main Entry Point
//! HTTP job API + admin JSON-RPC + background enrichment and warming

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelfwise_api_http::AppState;
use shelfwise_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use shelfwise_core::application::constants::{
    DEFAULT_MAINTENANCE_INTERVAL, ENRICHMENT_QUEUE_NAMESPACE, PROVIDER_MIN_INTERVAL,
};
use shelfwise_core::application::{
    EnrichmentQueue, EnrichmentWorker, JobProcessor, JobStateHub, LibraryEnricher,
    MaintenanceScheduler, ProcessorConfig, RateGate, RecoveryService, SearchService, TokenBucket,
    WarmingConfig, WarmingProcessor, WarmingScheduler, WorkerConfig,
};
use shelfwise_core::domain::RetentionConfig;
use shelfwise_core::port::{MaintenanceConfig, SystemTimeProvider, TimeProvider};
use shelfwise_infra_http::{HttpAnalysisEngine, HttpMetadataProvider};
use shelfwise_infra_sqlite::{
    create_pool, run_migrations, SqliteCursorStore, SqliteEntitySource, SqliteJobStateStore,
    SqliteMaintenance, SqliteMetadataCache, SqliteQueuePersistence, SqliteRecordStore,
};

use crate::config::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let _log_guard = init_logging()?;

    info!("Shelfwise daemon v{} starting...", VERSION);

    // 2. Load configuration
    let config = DaemonConfig::from_env();
    info!(db_path = %config.db_path, "Initializing database...");

    // 3. Initialize database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create data directory {}", parent.display()))?;
    }
    let pool = create_pool(&config.db_path)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let retention = RetentionConfig::default();
    let processor_config = ProcessorConfig {
        heartbeat_interval: config.heartbeat_interval,
        ..ProcessorConfig::default()
    };

    let state_store = Arc::new(SqliteJobStateStore::new(pool.clone()));
    let hub = Arc::new(JobStateHub::new(
        state_store.clone(),
        time_provider.clone(),
        retention,
        processor_config.idle_timeout * 2,
    ));

    let engine = HttpAnalysisEngine::new(&config.analyzer_url, processor_config.max_duration)
        .context("Analyzer client setup failed")?;
    let processor = Arc::new(JobProcessor::new(
        hub.clone(),
        Arc::new(engine),
        processor_config,
    ));

    // One gate for every outbound provider call: search, enrichment, warming
    let rate_gate = Arc::new(RateGate::new(PROVIDER_MIN_INTERVAL));
    let provider = Arc::new(
        HttpMetadataProvider::new(&config.provider_url, PROVIDER_TIMEOUT)
            .context("Metadata provider client setup failed")?,
    );
    let cache = Arc::new(SqliteMetadataCache::new(pool.clone()));
    let search = Arc::new(SearchService::new(
        cache.clone(),
        provider.clone(),
        rate_gate.clone(),
        time_provider.clone(),
    ));

    // 5. Run crash recovery
    info!("Running crash recovery...");
    let recovery_service = RecoveryService::new(
        state_store,
        time_provider.clone(),
        retention,
        None,
    );
    match recovery_service.recover_orphaned_jobs().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = ?e, "Crash recovery failed"),
    }

    let shutdown = CancellationToken::new();

    // 6. Enrichment queue + worker (resumes a persisted backlog)
    let records = Arc::new(SqliteRecordStore::new(pool.clone()));
    let queue = EnrichmentQueue::load(
        Arc::new(SqliteQueuePersistence::new(pool.clone())),
        time_provider.clone(),
        ENRICHMENT_QUEUE_NAMESPACE,
    )
    .await
    .context("Enrichment queue restore failed")?;
    let worker = Arc::new(EnrichmentWorker::new(
        Arc::new(queue),
        Arc::new(LibraryEnricher::new(
            records.clone(),
            provider.clone(),
            time_provider.clone(),
        )),
        rate_gate.clone(),
        WorkerConfig::default(),
        shutdown.child_token(),
    ));
    if !worker.queue().is_empty().await {
        worker.start();
    }

    // 7. Warming scheduler
    let warming_config = WarmingConfig {
        batch_size: config.warming_batch,
        interval: config.warming_interval,
        ..WarmingConfig::default()
    };
    let warming = Arc::new(WarmingScheduler::new(
        Arc::new(WarmingProcessor::new(
            Arc::new(SqliteEntitySource::new(pool.clone())),
            Arc::new(SqliteCursorStore::new(pool.clone())),
            cache,
            provider,
            rate_gate,
            time_provider.clone(),
            warming_config.clone(),
        )),
        warming_config.interval,
    ));
    let warming_handle = tokio::spawn(Arc::clone(&warming).run(shutdown.clone()));

    // 8. Maintenance scheduler
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone()));
    let maintenance_scheduler = Arc::new(MaintenanceScheduler::new(
        maintenance.clone(),
        time_provider.clone(),
        MaintenanceConfig::default(),
        DEFAULT_MAINTENANCE_INTERVAL,
    ));
    let maintenance_handle = tokio::spawn(maintenance_scheduler.run(shutdown.clone()));

    // 9. Start JSON-RPC server (admin)
    info!("Starting JSON-RPC server...");
    let rpc_handler = RpcHandler::new(
        hub,
        worker,
        records,
        warming,
        maintenance,
        time_provider,
        Arc::new(TokenBucket::new(
            config.rate_limit_burst,
            config.rate_limit_rate,
        )),
    );
    let rpc_config = RpcServerConfig {
        port: config.rpc_port,
        ..Default::default()
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, rpc_handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 10. Start HTTP server (job API)
    let state = AppState {
        processor,
        search,
        limiter: Arc::new(TokenBucket::new(
            config.rate_limit_burst,
            config.rate_limit_rate,
        )),
    };
    let listener = tokio::net::TcpListener::bind((config.http_host.as_str(), config.http_port))
        .await
        .with_context(|| format!("Cannot bind {}:{}", config.http_host, config.http_port))?;
    let http_addr = listener.local_addr()?;
    let http_handle = tokio::spawn(
        axum::serve(listener, shelfwise_api_http::app(state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    info!(http = %http_addr, rpc = %rpc_addr, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 11. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 12. Graceful shutdown
    shutdown.cancel();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    match tokio::time::timeout(SHUTDOWN_GRACE, http_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!("HTTP server still draining connections, abandoning them"),
    }
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = warming_handle.await;
        let _ = maintenance_handle.await;
    })
    .await;

    telemetry::shutdown();
    info!("Shutdown complete.");

    Ok(())
}

/// `SHELFWISE_LOG_FORMAT=json|pretty`, `SHELFWISE_LOG_DIR` for a daily
/// rolling file instead of stdout, OTLP export when configured.
///
/// The returned guard flushes the file writer on drop.
fn init_logging() -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let log_format = std::env::var("SHELFWISE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("shelfwise=info,tower_http=info"))
        .context("Failed to create env filter")?;

    let (writer, guard) = match std::env::var("SHELFWISE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(
                shellexpand::tilde(&dir).into_owned(),
                "shelfwise-daemon.log",
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        Err(_) => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let (otel, otel_error) = match telemetry::layer() {
        Ok(layer) => (layer, None),
        Err(e) => (None, Some(e)),
    };
    let otel_enabled = otel.is_some();

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(otel)
                .with(env_filter)
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        _ => {
            // Development: pretty formatting
            tracing_subscriber::registry()
                .with(otel)
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(writer))
                .init();
        }
    }

    if let Some(e) = otel_error {
        warn!(error = %e, "OpenTelemetry disabled");
    } else if otel_enabled {
        info!("OpenTelemetry export enabled");
    }

    Ok(guard)
}
