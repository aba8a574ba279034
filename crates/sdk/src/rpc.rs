//! Admin JSON-RPC client

use crate::coordinator::EnrichmentBackend;
use crate::error::{ClientError, Result};
use crate::types::{
    ClearResponse, EnqueueRequest, EnqueueResponse, ImportRequest, ImportResponse, ListRequest,
    ListResponse, MaintenanceRequest, MaintenanceResponse, PrioritizeRequest, PrioritizeResponse,
    StatsResponse, WarmingCursorResponse, WarmingLoadRequest, WarmingLoadResponse,
    WarmingRunResponse,
};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::{ArrayParams, ObjectParams};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shelfwise_core::application::EnrichmentStats;
use shelfwise_core::domain::{BookCandidate, JobId};
use std::time::Duration;

/// Shelfwise admin client
///
/// ```no_run
/// # use shelfwise_sdk::AdminClient;
/// # async fn example() -> Result<(), shelfwise_sdk::ClientError> {
/// let admin = AdminClient::connect("http://127.0.0.1:9527")?;
/// let stats = admin.stats().await?;
/// println!("{} records waiting for enrichment", stats.enrichment.remaining);
/// # Ok(())
/// # }
/// ```
pub struct AdminClient {
    client: HttpClient,
}

impl AdminClient {
    /// `url` is the RPC endpoint, e.g. `http://127.0.0.1:9527`
    pub fn connect(url: impl AsRef<str>) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url.as_ref())
            .map_err(|e| ClientError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        self.call("admin.stats.v1").await
    }

    pub async fn maintenance(&self, force_vacuum: bool) -> Result<MaintenanceResponse> {
        self.call_with("admin.maintenance.v1", &MaintenanceRequest { force_vacuum })
            .await
    }

    /// Persist analysis output as library records and queue them for enrichment
    pub async fn import_library(
        &self,
        job_id: &JobId,
        books: Vec<BookCandidate>,
    ) -> Result<ImportResponse> {
        let request = ImportRequest {
            job_id: job_id.to_string(),
            books,
        };
        self.call_with("library.import.v1", &request).await
    }

    pub async fn enqueue(&self, record_refs: Vec<String>) -> Result<EnqueueResponse> {
        self.call_with("queue.enqueue.v1", &EnqueueRequest { record_refs })
            .await
    }

    /// Move a record to the front of the enrichment queue
    pub async fn prioritize(&self, record_ref: impl Into<String>) -> Result<PrioritizeResponse> {
        let request = PrioritizeRequest {
            record_ref: record_ref.into(),
        };
        self.call_with("queue.prioritize.v1", &request).await
    }

    pub async fn clear(&self) -> Result<ClearResponse> {
        self.call("queue.clear.v1").await
    }

    pub async fn list(&self, limit: usize) -> Result<ListResponse> {
        self.call_with("queue.list.v1", &ListRequest { limit }).await
    }

    /// Trigger one warming run now
    pub async fn warming_run(&self) -> Result<WarmingRunResponse> {
        self.call("warming.run.v1").await
    }

    pub async fn warming_cursor(&self) -> Result<WarmingCursorResponse> {
        self.call("warming.cursor.v1").await
    }

    /// Replace the list of authors the warming processor cycles through
    pub async fn warming_load(&self, names: Vec<String>) -> Result<WarmingLoadResponse> {
        self.call_with("warming.load.v1", &WarmingLoadRequest { names })
            .await
    }

    async fn call<R: DeserializeOwned>(&self, method: &str) -> Result<R> {
        Ok(self.client.request(method, ArrayParams::new()).await?)
    }

    async fn call_with<T, R>(&self, method: &str, request: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        Ok(self.client.request(method, named(request)?).await?)
    }
}

#[async_trait]
impl EnrichmentBackend for AdminClient {
    async fn import(&self, job_id: &JobId, books: Vec<BookCandidate>) -> Result<ImportResponse> {
        self.import_library(job_id, books).await
    }

    async fn stats(&self) -> Result<EnrichmentStats> {
        Ok(AdminClient::stats(self).await?.enrichment)
    }
}

/// The server parses requests by field name, so send them as named params
fn named<T: Serialize>(request: &T) -> Result<ObjectParams> {
    let mut params = ObjectParams::new();
    match serde_json::to_value(request)? {
        serde_json::Value::Object(fields) => {
            for (name, value) in fields {
                params.insert(&name, value)?;
            }
            Ok(params)
        }
        other => Err(ClientError::Protocol(format!(
            "request must serialize to an object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::core::traits::ToRpcParams;

    #[test]
    fn test_named_params_carry_field_names() {
        let params = named(&PrioritizeRequest {
            record_ref: "scan-1:0".to_string(),
        })
        .unwrap();
        let raw = params.to_rpc_params().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(raw.get()).unwrap();
        assert_eq!(value, serde_json::json!({"record_ref": "scan-1:0"}));
    }

    #[test]
    fn test_named_rejects_non_objects() {
        assert!(matches!(named(&vec![1, 2]), Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        assert!(matches!(
            AdminClient::connect("not a url"),
            Err(ClientError::Connection(_))
        ));
    }
}
