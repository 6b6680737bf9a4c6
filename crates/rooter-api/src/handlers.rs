//! Request handlers and their response bodies.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rooter_core::{JobResult, JobStatus, MatchHit, MediaType, QueueStats};
use rooter_jobs::PollStatus;
use rooter_search::NamespacePolicy;

use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// RESPONSE TYPES
// =============================================================================

/// The matched work as seen by API clients.
#[derive(Debug, Clone, Serialize)]
pub struct WorkReference {
    pub id: Uuid,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobResultView {
    pub work: WorkReference,
    pub distance: u32,
    pub namespace: String,
}

impl From<JobResult> for JobResultView {
    fn from(r: JobResult) -> Self {
        Self {
            work: WorkReference {
                id: r.work_id,
                title: r.work_title,
            },
            distance: r.distance,
            namespace: r.namespace,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub handle: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub handle: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<JobResultView>>,
}

#[derive(Debug, Serialize)]
pub struct SearchHitView {
    pub work: WorkReference,
    pub distance: u32,
}

impl From<MatchHit> for SearchHitView {
    fn from(h: MatchHit) -> Self {
        Self {
            work: WorkReference {
                id: h.work_id,
                title: h.work_title,
            },
            distance: h.distance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub namespace: String,
    pub max_distance: u32,
    pub results: Vec<SearchHitView>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub namespaces: Vec<String>,
    pub hashers: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

// =============================================================================
// JOBS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    pub contact: Option<String>,
}

/// `POST /v1/jobs`: the raw request body is the payload.
pub async fn submit_job(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let job = state.intake.submit(&body, params.contact.as_deref()).await?;
    info!(
        subsystem = "api",
        op = "submit",
        job_id = %job.id,
        bytes = body.len(),
        "Job accepted"
    );
    let body = SubmitResponse {
        handle: job.id,
        status: job.status,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// `GET /v1/jobs/:handle`: 202 until the job is done, then 200 with results.
pub async fn poll_job(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Response, ApiError> {
    let id = Uuid::parse_str(handle.trim())
        .map_err(|_| ApiError::BadRequest(format!("invalid job handle: {}", handle)))?;

    let response = match state.intake.poll(id).await? {
        PollStatus::Processing => (
            StatusCode::ACCEPTED,
            Json(PollResponse {
                handle: id,
                status: JobStatus::Processing,
                completed_at: None,
                results: None,
            }),
        ),
        PollStatus::Done {
            completed_at,
            results,
        } => (
            StatusCode::OK,
            Json(PollResponse {
                handle: id,
                status: JobStatus::Done,
                completed_at: Some(completed_at),
                results: Some(results.into_iter().map(JobResultView::from).collect()),
            }),
        ),
    };
    Ok(response.into_response())
}

// =============================================================================
// SEARCH
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub hash: Option<String>,
    pub distance: Option<u32>,
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub limit: Option<usize>,
}

/// Pick the namespace a search runs in: explicit namespace, then the first
/// namespace accepting `type`, then the configured default when the request
/// names neither. A `type` no namespace accepts is rejected.
pub(crate) fn resolve_policy(
    state: &AppState,
    params: &SearchParams,
) -> Result<NamespacePolicy, ApiError> {
    if let Some(ns) = params.namespace.as_deref().filter(|s| !s.trim().is_empty()) {
        return state
            .registry
            .policy(ns.trim())
            .ok_or_else(|| ApiError::BadRequest(format!("unknown namespace: {}", ns)));
    }

    if let Some(raw) = params.media_type.as_deref().filter(|s| !s.trim().is_empty()) {
        let media_type = MediaType::new(raw);
        return state
            .registry
            .policy_for_media_type(&media_type)
            .ok_or_else(|| {
                debug!(subsystem = "api", media_type = %media_type, "No namespace accepts type");
                ApiError::BadRequest(format!("no namespace accepts {}", media_type))
            });
    }

    state.registry.policy(&state.default_namespace).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "unknown namespace: {}",
            state.default_namespace
        ))
    })
}

/// `GET /v1/search`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let hash = params
        .hash
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::BadRequest("hash is required".to_string()))?;

    let policy = resolve_policy(&state, &params)?;
    let outcome = state
        .matcher
        .search_hex(hash, &policy, params.distance, params.limit)
        .await?;

    debug!(
        subsystem = "api",
        op = "search",
        namespace = %outcome.namespace,
        max_distance = outcome.max_distance,
        result_count = outcome.hits.len(),
        "Search served"
    );

    Ok(Json(SearchResponse {
        namespace: outcome.namespace,
        max_distance: outcome.max_distance,
        results: outcome.hits.into_iter().map(SearchHitView::from).collect(),
    }))
}

// =============================================================================
// HEALTH
// =============================================================================

/// `GET /health`: liveness, namespaces, hasher availability, queue counts.
///
/// Responds 503 when the store cannot be reached.
pub async fn health(State(state): State<AppState>) -> Response {
    let hashers = state.registry.health_check_all().await;
    let namespaces = state
        .registry
        .namespaces()
        .into_iter()
        .map(str::to_string)
        .collect();

    let (status_code, status, queue) = match state.db.jobs.stats().await {
        Ok(stats) => (StatusCode::OK, "healthy", Some(stats)),
        Err(e) => {
            warn!(subsystem = "api", error = %e, "Queue stats unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", None)
        }
    };

    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        namespaces,
        hashers,
        queue,
    };
    (status_code, Json(body)).into_response()
}
