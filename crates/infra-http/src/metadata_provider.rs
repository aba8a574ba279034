// HTTP MetadataProvider Implementation
//
// GET {base}/search?q={text}&{params...} -> [MetadataRecord]

use async_trait::async_trait;
use shelfwise_core::domain::{MetadataRecord, SearchQuery};
use shelfwise_core::port::{MetadataProvider, ProviderError};
use std::time::Duration;
use tracing::debug;

/// Book metadata search client
pub struct HttpMetadataProvider {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpMetadataProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client =
            crate::build_client(timeout).map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout.as_millis() as u64)
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadataProvider {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataRecord>, ProviderError> {
        let url = format!("{}/search", self.base_url);

        let mut pairs: Vec<(&str, &str)> = vec![("q", query.text.as_str())];
        pairs.extend(query.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!(url = %url, q = %query.text, "Querying metadata provider");

        let response = self
            .http_client
            .get(&url)
            .query(&pairs)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json::<Vec<MetadataRecord>>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}
