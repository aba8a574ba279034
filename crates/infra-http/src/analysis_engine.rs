// HTTP AnalysisEngine Implementation
//
// Talks to the analyzer service:
//   POST {base}/analyze-bookshelf  {jobId, image, mimeType} -> {books: [...]}
//   POST {base}/parse-csv          {jobId, header, rows}    -> {books: [...]}

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use shelfwise_core::domain::{BookCandidate, JobType};
use shelfwise_core::port::{AnalysisEngine, AnalysisError, AnalysisRequest, ProgressSink};
use std::time::Duration;
use tracing::{debug, info};

/// Rows sent to the analyzer per CSV request
pub const CSV_CHUNK_ROWS: usize = 25;

const SCAN_STEPS: u32 = 3;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanPayload {
    image: String,
    #[serde(default = "default_mime_type")]
    mime_type: String,
}

fn default_mime_type() -> String {
    "image/jpeg".to_string()
}

#[derive(Deserialize)]
struct CsvPayload {
    csv: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanRequest<'a> {
    job_id: &'a str,
    image: &'a str,
    mime_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CsvChunkRequest<'a> {
    job_id: &'a str,
    header: &'a [String],
    rows: &'a [Vec<String>],
}

#[derive(Deserialize)]
struct AnalyzerResponse {
    #[serde(default)]
    books: Vec<BookCandidate>,
}

/// Analyzer service client
pub struct HttpAnalysisEngine {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisEngine {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let http_client =
            crate::build_client(timeout).map_err(|e| AnalysisError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Vec<BookCandidate>, AnalysisError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling analyzer");

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Upstream(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text.trim()
            )));
        }

        let parsed: AnalyzerResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Upstream(format!("invalid response: {}", e)))?;

        Ok(parsed.books)
    }

    async fn scan(
        &self,
        request: &AnalysisRequest,
        progress: &ProgressSink,
    ) -> Result<Vec<BookCandidate>, AnalysisError> {
        let payload: ScanPayload = serde_json::from_value(request.payload.clone())
            .map_err(|e| AnalysisError::InvalidPayload(e.to_string()))?;

        if STANDARD.decode(payload.image.as_bytes()).is_err() {
            return Err(AnalysisError::InvalidPayload(
                "image is not valid base64".to_string(),
            ));
        }

        progress.report(0, SCAN_STEPS, "Uploading image");
        progress.report(1, SCAN_STEPS, "Detecting book spines");

        let books = self
            .post(
                "/analyze-bookshelf",
                &ScanRequest {
                    job_id: request.identifier.job_id.as_str(),
                    image: &payload.image,
                    mime_type: &payload.mime_type,
                },
            )
            .await?;

        progress.report(SCAN_STEPS, SCAN_STEPS, format!("Found {} books", books.len()));
        Ok(books)
    }

    async fn import_csv(
        &self,
        request: &AnalysisRequest,
        progress: &ProgressSink,
    ) -> Result<Vec<BookCandidate>, AnalysisError> {
        let payload: CsvPayload = serde_json::from_value(request.payload.clone())
            .map_err(|e| AnalysisError::InvalidPayload(e.to_string()))?;
        let (header, rows) = read_csv(&payload.csv)?;

        let total = rows.len() as u32;
        progress.report(0, total, format!("Parsing {} rows", total));

        let mut books = Vec::new();
        let mut processed = 0u32;
        for chunk in rows.chunks(CSV_CHUNK_ROWS) {
            let parsed = self
                .post(
                    "/parse-csv",
                    &CsvChunkRequest {
                        job_id: request.identifier.job_id.as_str(),
                        header: &header,
                        rows: chunk,
                    },
                )
                .await?;
            books.extend(parsed);

            processed += chunk.len() as u32;
            progress.report(processed, total, format!("Parsed {} of {} rows", processed, total));
        }

        Ok(books)
    }
}

/// Split a CSV export into its header and non-empty rows
fn read_csv(text: &str) -> Result<(Vec<String>, Vec<Vec<String>>), AnalysisError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| AnalysisError::InvalidPayload(format!("unreadable CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(AnalysisError::InvalidPayload("CSV has no header".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| AnalysisError::InvalidPayload(format!("malformed CSV row: {}", e)))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok((header, rows))
}

#[async_trait]
impl AnalysisEngine for HttpAnalysisEngine {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        progress: ProgressSink,
    ) -> Result<serde_json::Value, AnalysisError> {
        let job_type = request.identifier.job_type;
        let books = match job_type {
            JobType::BookshelfScan => self.scan(request, &progress).await?,
            JobType::CsvImport => self.import_csv(request, &progress).await?,
            JobType::Enrichment => return Err(AnalysisError::Unsupported(job_type)),
        };

        info!(
            job_id = %request.identifier.job_id,
            job_type = %job_type,
            books = books.len(),
            "Analysis finished"
        );

        Ok(serde_json::json!({ "books": books }))
    }
}
