//! Coordinator HTTP API.
//!
//! Two independent surfaces over one shared [`JobStore`]:
//! - Cloud-facing (x-api-key): enqueue jobs, read job status, list agents
//! - Agent-facing (x-agent-token): heartbeat, poll, submit results
//!
//! Credentials are checked before any business logic; validation errors are
//! rejected before any mutation. State is built explicitly in the binary and
//! injected through `with_state` — there are no ambient globals.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{check_credential, AuthOutcome, CredentialClass};
use crate::config::{RelaySettings, DEFAULT_MAX_JOBS_PER_POLL, MAX_JOBS_PER_POLL_LIMIT};
use crate::job::{Job, JobOutcome, JobStatus};
use crate::store::{AgentSummary, JobStore, StoreError};

// ============================================================================
// SERVER STATE
// ============================================================================

pub struct RelayState {
    pub store: JobStore,
    pub settings: RelaySettings,
}

impl RelayState {
    pub fn new(store: JobStore, settings: RelaySettings) -> Self {
        Self { store, settings }
    }
}

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// API-level errors, mapped onto HTTP statuses. Bodies use the same
/// `{"detail": ...}` shape for every error class.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid API key.")]
    InvalidApiKey,
    #[error("Invalid agent token.")]
    InvalidAgentToken,
    #[error("Cloud API auth is required but no API key is configured.")]
    CloudAuthMisconfigured,
    #[error("Agent auth is required but no shared secret is configured.")]
    AgentAuthMisconfigured,
    #[error("Job not found.")]
    JobNotFound,
    #[error("Job does not belong to this agent.")]
    NotOwner,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidApiKey | ApiError::InvalidAgentToken => StatusCode::UNAUTHORIZED,
            ApiError::NotOwner => StatusCode::FORBIDDEN,
            ApiError::JobNotFound => StatusCode::NOT_FOUND,
            ApiError::CloudAuthMisconfigured | ApiError::AgentAuthMisconfigured => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::JobNotFound(_) => ApiError::JobNotFound,
            StoreError::NotOwner { .. } => ApiError::NotOwner,
        }
    }
}

// ============================================================================
// AUTH GUARDS
// ============================================================================

fn supplied_header<'a>(headers: &'a HeaderMap, class: CredentialClass) -> Option<&'a str> {
    headers.get(class.header()).and_then(|v| v.to_str().ok())
}

fn require_cloud(state: &RelayState, headers: &HeaderMap) -> Result<(), ApiError> {
    let outcome = check_credential(
        state.settings.cloud_api_key.as_deref(),
        supplied_header(headers, CredentialClass::Cloud),
        state.settings.auth_required,
    );
    match outcome {
        AuthOutcome::Authorized => Ok(()),
        AuthOutcome::Unauthorized => Err(ApiError::InvalidApiKey),
        AuthOutcome::Misconfigured => Err(ApiError::CloudAuthMisconfigured),
    }
}

fn require_agent(state: &RelayState, headers: &HeaderMap) -> Result<(), ApiError> {
    let outcome = check_credential(
        state.settings.agent_shared_secret.as_deref(),
        supplied_header(headers, CredentialClass::Agent),
        state.settings.auth_required,
    );
    match outcome {
        AuthOutcome::Authorized => Ok(()),
        AuthOutcome::Unauthorized => Err(ApiError::InvalidAgentToken),
        AuthOutcome::Misconfigured => Err(ApiError::AgentAuthMisconfigured),
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

fn validate_agent_id(agent_id: &str) -> Result<String, ApiError> {
    let normalized = agent_id.trim();
    // Bounds count characters, not bytes, so multibyte ids are not penalized.
    if normalized.is_empty() || normalized.chars().count() > 128 {
        return Err(ApiError::Validation(
            "agent_id must be 1-128 characters.".to_string(),
        ));
    }
    Ok(normalized.to_string())
}

fn validate_kind(kind: &str) -> Result<String, ApiError> {
    let normalized = kind.trim().to_lowercase();
    if normalized.is_empty() || normalized.chars().count() > 64 {
        return Err(ApiError::Validation(
            "kind must be 1-64 characters.".to_string(),
        ));
    }
    Ok(normalized)
}

fn validate_max_jobs(max_jobs: Option<u32>) -> Result<usize, ApiError> {
    let requested = max_jobs.unwrap_or(DEFAULT_MAX_JOBS_PER_POLL);
    if requested < 1 || requested > MAX_JOBS_PER_POLL_LIMIT {
        return Err(ApiError::Validation(format!(
            "max_jobs must be 1-{}.",
            MAX_JOBS_PER_POLL_LIMIT
        )));
    }
    Ok(requested as usize)
}

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub agent_id: String,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub status: String,
    pub job_id: String,
    pub agent_id: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub version: Option<String>,
    pub hostname: Option<String>,
    pub local_backend_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollRequest {
    pub max_jobs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub agent_id: String,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultRequest {
    /// "success" or "error".
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultResponse {
    pub status: String,
    pub job_id: String,
    pub job_status: JobStatus,
}

// ============================================================================
// CLOUD-FACING HANDLERS
// ============================================================================

/// POST /api/remote/jobs — enqueue a job for an agent.
///
/// No validation that the agent exists or is alive; jobs for an agent that
/// never polls stay queued indefinitely.
pub async fn enqueue_job(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    require_cloud(&state, &headers)?;

    let agent_id = validate_agent_id(&req.agent_id)?;
    let kind = validate_kind(&req.kind)?;

    let job = state
        .store
        .enqueue(&agent_id, &kind, serde_json::Value::Object(req.payload));

    info!("Queued job {} (kind={}) for agent {}", job.job_id, kind, agent_id);

    Ok(Json(EnqueueResponse {
        status: "queued".to_string(),
        job_id: job.job_id,
        agent_id: job.agent_id,
        kind: job.kind,
        created_at: job.created_at,
    }))
}

/// GET /api/remote/jobs/:job_id — full job snapshot.
pub async fn get_job_status(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    require_cloud(&state, &headers)?;
    Ok(Json(state.store.get(&job_id)?))
}

/// GET /api/remote/agents — all known agents, sorted by id. Never mutates.
pub async fn list_agents(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
) -> Result<Json<AgentListResponse>, ApiError> {
    require_cloud(&state, &headers)?;
    Ok(Json(AgentListResponse {
        agents: state.store.list_agents(),
    }))
}

// ============================================================================
// AGENT-FACING HANDLERS
// ============================================================================

/// POST /api/agent/:agent_id/heartbeat — upsert the agent's liveness record.
pub async fn agent_heartbeat(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    require_agent(&state, &headers)?;
    let agent_id = validate_agent_id(&agent_id)?;

    state
        .store
        .touch(&agent_id, req.version, req.hostname, req.local_backend_url);

    Ok(Json(HeartbeatResponse {
        status: "ok".to_string(),
        agent_id,
    }))
}

/// POST /api/agent/:agent_id/poll — dispatch up to max_jobs queued jobs.
///
/// An empty or nonexistent queue yields an empty list, not an error. Polling
/// refreshes the agent's last_seen either way.
pub async fn agent_poll(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
    Json(req): Json<PollRequest>,
) -> Result<Json<PollResponse>, ApiError> {
    require_agent(&state, &headers)?;
    let agent_id = validate_agent_id(&agent_id)?;
    let max_jobs = validate_max_jobs(req.max_jobs)?;

    let jobs = state.store.dispatch(&agent_id, max_jobs);

    Ok(Json(PollResponse { agent_id, jobs }))
}

/// POST /api/agent/:agent_id/jobs/:job_id/result — record a terminal outcome.
pub async fn agent_submit_result(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Path((agent_id, job_id)): Path<(String, String)>,
    Json(req): Json<JobResultRequest>,
) -> Result<Json<JobResultResponse>, ApiError> {
    require_agent(&state, &headers)?;
    let agent_id = validate_agent_id(&agent_id)?;

    let outcome = JobOutcome::parse(&req.status)
        .ok_or_else(|| ApiError::Validation("status must be success or error.".to_string()))?;

    let job = state
        .store
        .record_result(&agent_id, &job_id, outcome, req.result, req.error)?;

    Ok(Json(JobResultResponse {
        status: "recorded".to_string(),
        job_id: job.job_id,
        job_status: job.status,
    }))
}

// ============================================================================
// ROUTER & STARTUP
// ============================================================================

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the coordinator router over explicitly constructed state.
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Cloud-facing
        .route("/api/remote/jobs", post(enqueue_job))
        .route("/api/remote/jobs/:job_id", get(get_job_status))
        .route("/api/remote/agents", get(list_agents))
        // Agent-facing
        .route("/api/agent/:agent_id/heartbeat", post(agent_heartbeat))
        .route("/api/agent/:agent_id/poll", post(agent_poll))
        .route(
            "/api/agent/:agent_id/jobs/:job_id/result",
            post(agent_submit_result),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn run_server(state: Arc<RelayState>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Relay coordinator listening on {}", addr);
    info!("  GET  /health");
    info!("  POST /api/remote/jobs                        (cloud)");
    info!("  GET  /api/remote/jobs/:job_id                (cloud)");
    info!("  GET  /api/remote/agents                      (cloud)");
    info!("  POST /api/agent/:agent_id/heartbeat          (agent)");
    info!("  POST /api/agent/:agent_id/poll               (agent)");
    info!("  POST /api/agent/:agent_id/jobs/:job_id/result (agent)");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_validation() {
        assert_eq!(validate_agent_id("  display-7  ").unwrap(), "display-7");
        assert!(validate_agent_id("   ").is_err());
        assert!(validate_agent_id(&"x".repeat(129)).is_err());
        assert_eq!(validate_agent_id(&"x".repeat(128)).unwrap().len(), 128);
    }

    #[test]
    fn test_length_bounds_count_characters_not_bytes() {
        // 128 two-byte characters is within bounds despite 256 bytes.
        let id = "ü".repeat(128);
        assert_eq!(validate_agent_id(&id).unwrap(), id);
        assert!(validate_agent_id(&"ü".repeat(129)).is_err());

        assert_eq!(validate_kind(&"ü".repeat(64)).unwrap().chars().count(), 64);
        assert!(validate_kind(&"ü".repeat(65)).is_err());
    }

    #[test]
    fn test_kind_validation_lowercases() {
        assert_eq!(validate_kind(" TV ").unwrap(), "tv");
        assert!(validate_kind("").is_err());
        assert!(validate_kind(&"k".repeat(65)).is_err());
    }

    #[test]
    fn test_max_jobs_bounds() {
        assert_eq!(validate_max_jobs(None).unwrap(), 5);
        assert_eq!(validate_max_jobs(Some(1)).unwrap(), 1);
        assert_eq!(validate_max_jobs(Some(50)).unwrap(), 50);
        assert!(validate_max_jobs(Some(0)).is_err());
        assert!(validate_max_jobs(Some(51)).is_err());
    }

    #[test]
    fn test_store_error_mapping() {
        let err: ApiError = StoreError::JobNotFound("x".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = StoreError::NotOwner {
            job_id: "j".to_string(),
            agent_id: "a".to_string(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        assert_eq!(
            ApiError::CloudAuthMisconfigured.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
