//! Boots a real backend on ephemeral ports: the axum job API and the admin
//! JSON-RPC server, both over one in-memory SQLite database.

#![allow(dead_code)]

use jsonrpsee::server::ServerHandle;
use shelfwise_api_http::{app, AppState};
use shelfwise_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use shelfwise_core::application::constants::ENRICHMENT_QUEUE_NAMESPACE;
use shelfwise_core::application::{
    EnrichmentQueue, EnrichmentWorker, JobProcessor, JobStateHub, ProcessorConfig, RateGate,
    SearchService, TokenBucket, WarmingConfig, WarmingProcessor, WarmingScheduler, WorkerConfig,
};
use shelfwise_core::domain::RetentionConfig;
use shelfwise_core::port::enrichment_provider::mocks::RecordingEnricher;
use shelfwise_core::port::metadata_provider::mocks::MockMetadataProvider;
use shelfwise_core::port::{AnalysisEngine, SystemTimeProvider, TimeProvider};
use shelfwise_infra_sqlite::{
    create_pool, run_migrations, SqliteCursorStore, SqliteEntitySource, SqliteJobStateStore,
    SqliteMaintenance, SqliteMetadataCache, SqliteQueuePersistence, SqliteRecordStore,
};
use shelfwise_sdk::{JobClient, SelectorConfig, TransportSelector, WebSocketChannel};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Backend {
    pub http_url: String,
    pub rpc_url: String,
    pub enricher: Arc<RecordingEnricher>,
    pub records: Arc<SqliteRecordStore>,
    shutdown: CancellationToken,
    rpc: ServerHandle,
}

impl Backend {
    pub async fn start(engine: Arc<dyn AnalysisEngine>, config: ProcessorConfig) -> Backend {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let shutdown = CancellationToken::new();

        let hub = Arc::new(JobStateHub::new(
            Arc::new(SqliteJobStateStore::new(pool.clone())),
            time.clone(),
            RetentionConfig::default(),
            config.idle_timeout * 2,
        ));
        let processor = Arc::new(JobProcessor::new(hub.clone(), engine, config));

        let gate = Arc::new(RateGate::new(Duration::ZERO));
        let cache = Arc::new(SqliteMetadataCache::new(pool.clone()));
        let provider = Arc::new(MockMetadataProvider::new());
        let search = Arc::new(SearchService::new(
            cache.clone(),
            provider.clone(),
            gate.clone(),
            time.clone(),
        ));

        let queue = EnrichmentQueue::load(
            Arc::new(SqliteQueuePersistence::new(pool.clone())),
            time.clone(),
            ENRICHMENT_QUEUE_NAMESPACE,
        )
        .await
        .unwrap();
        let enricher = Arc::new(RecordingEnricher::new());
        let worker = Arc::new(EnrichmentWorker::new(
            Arc::new(queue),
            enricher.clone(),
            gate.clone(),
            WorkerConfig::default(),
            shutdown.child_token(),
        ));

        let warming = Arc::new(WarmingScheduler::new(
            Arc::new(WarmingProcessor::new(
                Arc::new(SqliteEntitySource::new(pool.clone())),
                Arc::new(SqliteCursorStore::new(pool.clone())),
                cache,
                provider,
                gate,
                time.clone(),
                WarmingConfig::default(),
            )),
            Duration::from_secs(300),
        ));

        let records = Arc::new(SqliteRecordStore::new(pool.clone()));
        let handler = RpcHandler::new(
            hub,
            worker,
            records.clone(),
            warming,
            Arc::new(SqliteMaintenance::new(pool)),
            time,
            Arc::new(TokenBucket::new(100, 100)),
        );
        let rpc_config = RpcServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let (rpc_addr, rpc) = RpcServer::new(rpc_config, handler).start().await.unwrap();

        let state = AppState {
            processor,
            search,
            limiter: Arc::new(TokenBucket::new(100, 100)),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = listener.local_addr().unwrap();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app(state))
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
        });

        Backend {
            http_url: format!("http://{}", http_addr),
            rpc_url: format!("http://{}", rpc_addr),
            enricher,
            records,
            shutdown,
            rpc,
        }
    }

    pub fn client(&self) -> JobClient {
        JobClient::new(&self.http_url).unwrap()
    }

    /// Selector over the real WebSocket channel and status endpoint
    pub fn selector(&self, config: SelectorConfig) -> TransportSelector {
        let client = self.client();
        TransportSelector::new(
            Arc::new(WebSocketChannel::from_http_base(client.base_url())),
            Arc::new(client),
            config,
        )
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let _ = self.rpc.stop();
    }
}
