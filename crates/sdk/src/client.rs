//! HTTP client for the job API

use crate::error::{ClientError, Result};
use crate::transport::StatusSource;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use shelfwise_core::application::SearchOutcome;
use shelfwise_core::domain::{
    JobId, JobStatusResponse, JobSubmission, MetadataRecord, SearchQuery, SubmitAck,
};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shelfwise job API client
///
/// ```no_run
/// # use shelfwise_sdk::JobClient;
/// # async fn example() -> Result<(), shelfwise_sdk::ClientError> {
/// let client = JobClient::new("http://127.0.0.1:8787")?;
/// let status = client.status(&"job-1".into()).await?;
/// println!("{:?}", status.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JobClient {
    http: reqwest::Client,
    /// Submissions stay open for the whole invocation, so no overall timeout
    streaming: reqwest::Client,
    base_url: String,
}

impl JobClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url));
        }

        let user_agent = concat!("shelfwise-sdk/", env!("CARGO_PKG_VERSION"));
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let streaming = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            streaming,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /jobs`, returning once the server acknowledged.
    ///
    /// The server runs the job inside this request: keep the returned
    /// `Submitted` alive (usually by awaiting `outcome` in a task) until the
    /// job is terminal. Dropping it abandons the invocation.
    pub async fn submit(&self, submission: &JobSubmission) -> Result<Submitted> {
        let url = format!("{}/jobs", self.base_url);
        let response = self.streaming.post(&url).json(submission).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        let mut lines = NdjsonLines::new(response);
        let ack: SubmitAck = match lines.next_line().await? {
            Some(line) => serde_json::from_str(&line)?,
            None => {
                return Err(ClientError::Protocol(
                    "submission stream ended before the acknowledgement".to_string(),
                ))
            }
        };
        debug!(job_id = %ack.job_id, "Submission acknowledged");

        Ok(Submitted { ack, lines })
    }

    /// `GET /job/{id}/status`
    pub async fn status(&self, job_id: &JobId) -> Result<JobStatusResponse> {
        let url = format!("{}/job/{}/status", self.base_url, job_id);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(job_id.to_string())),
            status if status.is_server_error() => Err(ClientError::Connection(format!(
                "status endpoint answered {}",
                status
            ))),
            status if !status.is_success() => Err(rejection(status, response).await),
            _ => Ok(response.json().await?),
        }
    }

    /// `GET /search`, cache-first on the server
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataRecord>> {
        let url = format!("{}/search", self.base_url);
        let mut params: Vec<(&str, &str)> = vec![("q", query.text.as_str())];
        params.extend(query.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self.http.get(&url).query(&params).send().await?;
        json_or_rejection(response).await
    }

    /// `GET /author/{name}`
    pub async fn author(&self, name: &str) -> Result<SearchOutcome> {
        let invalid = || ClientError::InvalidUrl(self.base_url.clone());
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|_| invalid())?;
        // Pushed as one segment, so `/` and `?` in a name are escaped
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["author", name]);

        let response = self.http.get(url).send().await?;
        json_or_rejection(response).await
    }
}

#[async_trait]
impl StatusSource for JobClient {
    async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatusResponse> {
        self.status(job_id).await
    }
}

/// An acknowledged submission whose invocation is still running
pub struct Submitted {
    pub ack: SubmitAck,
    lines: NdjsonLines,
}

impl Submitted {
    /// Drain the response stream; its last line is the terminal status
    pub async fn outcome(mut self) -> Result<JobStatusResponse> {
        let mut last = None;
        while let Some(line) = self.lines.next_line().await? {
            last = Some(line);
        }
        let line = last.ok_or_else(|| {
            ClientError::Protocol("submission stream ended without a terminal status".to_string())
        })?;
        Ok(serde_json::from_str(&line)?)
    }
}

/// Newline-delimited JSON over a chunked response body
struct NdjsonLines {
    response: reqwest::Response,
    buffer: Vec<u8>,
    done: bool,
}

impl NdjsonLines {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: Vec::new(),
            done: false,
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line).trim().to_string();
                if text.is_empty() {
                    continue;
                }
                return Ok(Some(text));
            }

            if self.done {
                let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
                self.buffer.clear();
                return Ok((!rest.is_empty()).then_some(rest));
            }

            match self.response.chunk().await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => self.done = true,
            }
        }
    }
}

async fn json_or_rejection<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_server_error() {
        return Err(ClientError::Connection(format!("server answered {}", status)));
    }
    if !status.is_success() {
        return Err(rejection(status, response).await);
    }
    Ok(response.json().await?)
}

/// Map a non-2xx answer, preferring the server's `{"error": ...}` body
async fn rejection(status: StatusCode, response: reqwest::Response) -> ClientError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);

    if status == StatusCode::NOT_FOUND {
        return ClientError::NotFound(message);
    }
    ClientError::Rejected {
        status: status.as_u16(),
        message,
    }
}
