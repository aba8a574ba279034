use crate::error::ApiError;
use crate::{AppState, CACHE_HEADER};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{future, stream, StreamExt};
use serde::Serialize;
use shelfwise_core::application::SearchOutcome;
use shelfwise_core::domain::{
    JobId, JobStatusResponse, JobSubmission, MetadataRecord, SearchQuery, SubmitAck,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const NDJSON: &str = "application/x-ndjson";

fn ndjson_line<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// `POST /jobs`
///
/// Streams the acknowledgement first, then drives the job inside this same
/// response and ends with its terminal status. Dropping the connection drops
/// the work; readers then see the job as lost once its heartbeat goes stale.
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<JobSubmission>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(submission) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if !state.limiter.try_acquire() {
        warn!(job_id = %submission.job_id, "Job submission rate limited");
        return Err(ApiError::RateLimited);
    }

    let writer = state.processor.accept(&submission).await?;
    let identifier = writer.identifier().clone();

    info!(job_id = %identifier.job_id, job_type = %identifier.job_type, "Job accepted");

    let ack = ndjson_line(&SubmitAck {
        accepted: true,
        job_id: identifier.job_id.clone(),
    })
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let processor = Arc::clone(&state.processor);
    let payload = submission.payload;
    let terminal = async move {
        let status = processor.process(writer, payload).await;
        let response = JobStatusResponse::new(&identifier, &status, processor.hub().now());
        ndjson_line(&response)
    };

    let lines = stream::once(future::ready(Ok(ack))).chain(stream::once(terminal));

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

/// `GET /job/{id}/status`
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = JobId::new(job_id);
    match state.processor.hub().snapshot(&job_id).await? {
        Some(job_state) => Ok(Json(job_state.to_response())),
        None => Err(ApiError::NotFound(format!("job {}", job_id))),
    }
}

/// `GET /search?q=...&key=value...`
///
/// Same contract as the upstream provider, so clients can use the daemon as
/// their metadata provider.
pub async fn search(
    State(state): State<AppState>,
    Query(mut params): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError> {
    let text = params
        .remove("q")
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing query parameter q".to_string()))?;

    let query = params
        .into_iter()
        .fold(SearchQuery::new(text), |query, (k, v)| query.with_param(k, v));

    let outcome = state.search.search(&query).await?;
    Ok(with_cache_header(outcome.cached, outcome.records))
}

/// `GET /author/{name}`
pub async fn author(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SearchOutcome>, ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("author name must not be empty".to_string()));
    }
    Ok(Json(state.search.author(&name).await?))
}

fn with_cache_header(cached: bool, records: Vec<MetadataRecord>) -> Response {
    let hit = if cached { "hit" } else { "miss" };
    ([(CACHE_HEADER, hit)], Json(records)).into_response()
}
