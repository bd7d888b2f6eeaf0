//! Integration tests for the coordinator HTTP API.
//!
//! Drives the axum router directly with `tower::ServiceExt::oneshot`, no
//! sockets involved.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use signage_relay::{router, JobStore, RelaySettings, RelayState};
use std::sync::Arc;
use tower::ServiceExt;

const CLOUD_KEY: &str = "cloud-key";
const AGENT_SECRET: &str = "agent-secret";

fn app_with(settings: RelaySettings) -> axum::Router {
    router(Arc::new(RelayState::new(JobStore::new(), settings)))
}

/// Router with both credential classes configured and enforcement on.
fn secured_app() -> axum::Router {
    app_with(RelaySettings::new(
        Some(CLOUD_KEY.to_string()),
        Some(AGENT_SECRET.to_string()),
        true,
    ))
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn cloud_headers() -> Vec<(&'static str, &'static str)> {
    vec![("x-api-key", CLOUD_KEY)]
}

fn agent_headers() -> Vec<(&'static str, &'static str)> {
    vec![("x-agent-token", AGENT_SECRET)]
}

async fn enqueue(app: &axum::Router, agent_id: &str, kind: &str, payload: Value) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/remote/jobs",
        &cloud_headers(),
        Some(json!({ "agent_id": agent_id, "kind": kind, "payload": payload })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn job_status(app: &axum::Router, job_id: &str) -> Value {
    let (status, body) = send(
        app,
        "GET",
        &format!("/api/remote/jobs/{job_id}"),
        &cloud_headers(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_health_requires_no_auth() {
    let app = secured_app();
    let (status, body) = send(&app, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_enqueue_poll_report_lifecycle() {
    let app = secured_app();

    let queued = enqueue(
        &app,
        "display-7",
        "tv",
        json!({"ip": "10.0.0.5", "command": "on"}),
    )
    .await;
    assert_eq!(queued["status"], "queued");
    assert_eq!(queued["agent_id"], "display-7");
    assert_eq!(queued["kind"], "tv");
    let job_id = queued["job_id"].as_str().unwrap().to_string();

    let snapshot = job_status(&app, &job_id).await;
    assert_eq!(snapshot["status"], "queued");

    let (status, body) = send(
        &app,
        "POST",
        "/api/agent/display-7/poll",
        &agent_headers(),
        Some(json!({"max_jobs": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["job_id"], job_id.as_str());
    assert_eq!(jobs[0]["status"], "dispatched");
    assert_eq!(jobs[0]["payload"]["ip"], "10.0.0.5");

    let snapshot = job_status(&app, &job_id).await;
    assert_eq!(snapshot["status"], "dispatched");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/agent/display-7/jobs/{job_id}/result"),
        &agent_headers(),
        Some(json!({"status": "success", "result": {"http_status": 200}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "recorded");
    assert_eq!(body["job_status"], "completed");

    let snapshot = job_status(&app, &job_id).await;
    assert_eq!(snapshot["status"], "completed");
    assert_eq!(snapshot["result"]["http_status"], 200);
    assert!(snapshot["error"].is_null());
}

#[tokio::test]
async fn test_kind_is_normalized_on_enqueue() {
    let app = secured_app();
    let queued = enqueue(&app, "a1", "  TV  ", json!({})).await;
    assert_eq!(queued["kind"], "tv");
}

#[tokio::test]
async fn test_failed_result_stores_error() {
    let app = secured_app();
    let queued = enqueue(&app, "a1", "tv", json!({})).await;
    let job_id = queued["job_id"].as_str().unwrap().to_string();

    send(
        &app,
        "POST",
        "/api/agent/a1/poll",
        &agent_headers(),
        Some(json!({})),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/agent/a1/jobs/{job_id}/result"),
        &agent_headers(),
        Some(json!({"status": "error", "error": "display unreachable"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_status"], "failed");

    let snapshot = job_status(&app, &job_id).await;
    assert_eq!(snapshot["status"], "failed");
    assert_eq!(snapshot["error"], "display unreachable");
    assert!(snapshot["result"].is_null());
}

#[tokio::test]
async fn test_poll_empty_queue_returns_empty_list() {
    let app = secured_app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/agent/idle-agent/poll",
        &agent_headers(),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_id"], "idle-agent");
    assert_eq!(body["jobs"].as_array().unwrap().len(), 0);
}

// ============================================================================
// AUTH
// ============================================================================

#[tokio::test]
async fn test_cloud_endpoints_reject_missing_or_wrong_key() {
    let app = secured_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/remote/jobs",
        &[],
        Some(json!({"agent_id": "a1", "kind": "tv"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        "GET",
        "/api/remote/agents",
        &[("x-api-key", "wrong")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].as_str().unwrap().contains("API key"));
}

#[tokio::test]
async fn test_agent_endpoints_reject_missing_or_wrong_token() {
    let app = secured_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/agent/a1/poll",
        &[],
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        "/api/agent/a1/heartbeat",
        &[("x-agent-token", "wrong")],
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_secrets_fail_closed() {
    // Enforcement on, nothing configured: both classes must 503, not open up.
    let app = app_with(RelaySettings::new(None, None, true));

    let (status, body) = send(&app, "GET", "/api/remote/agents", &cloud_headers(), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("no API key"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/agent/a1/poll",
        &agent_headers(),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_auth_optional_allows_unauthenticated_calls() {
    let app = app_with(RelaySettings::new(None, None, false));

    let (status, _) = send(
        &app,
        "POST",
        "/api/remote/jobs",
        &[],
        Some(json!({"agent_id": "a1", "kind": "tv"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", "/api/agent/a1/poll", &[], Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_configured_secret_enforced_even_when_optional() {
    let app = app_with(RelaySettings::new(Some(CLOUD_KEY.to_string()), None, false));

    let (status, _) = send(&app, "GET", "/api/remote/agents", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/remote/agents", &cloud_headers(), None).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn test_enqueue_validation_rejects_before_mutation() {
    let app = secured_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/remote/jobs",
        &cloud_headers(),
        Some(json!({"agent_id": "   ", "kind": "tv"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/remote/jobs",
        &cloud_headers(),
        Some(json!({"agent_id": "a1", "kind": "k".repeat(65)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was queued and no agent record appeared.
    let (_, body) = send(&app, "GET", "/api/remote/agents", &cloud_headers(), None).await;
    assert_eq!(body["agents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_poll_max_jobs_bounds() {
    let app = secured_app();

    for max_jobs in [0, 51] {
        let (status, _) = send(
            &app,
            "POST",
            "/api/agent/a1/poll",
            &agent_headers(),
            Some(json!({"max_jobs": max_jobs})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "max_jobs={max_jobs}");
    }
}

#[tokio::test]
async fn test_poll_bound_leaves_remainder_queued() {
    let app = secured_app();
    for _ in 0..5 {
        enqueue(&app, "a1", "tv", json!({})).await;
    }

    let (_, body) = send(
        &app,
        "POST",
        "/api/agent/a1/poll",
        &agent_headers(),
        Some(json!({"max_jobs": 2})),
    )
    .await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);

    let (_, body) = send(&app, "GET", "/api/remote/agents", &cloud_headers(), None).await;
    assert_eq!(body["agents"][0]["queue_depth"], 3);
}

#[tokio::test]
async fn test_result_status_must_be_success_or_error() {
    let app = secured_app();
    let queued = enqueue(&app, "a1", "tv", json!({})).await;
    let job_id = queued["job_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/agent/a1/jobs/{job_id}/result"),
        &agent_headers(),
        Some(json!({"status": "done"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// OWNERSHIP & NOT-FOUND
// ============================================================================

#[tokio::test]
async fn test_result_from_non_owner_is_forbidden_and_mutates_nothing() {
    let app = secured_app();
    let queued = enqueue(&app, "a1", "tv", json!({})).await;
    let job_id = queued["job_id"].as_str().unwrap().to_string();

    send(
        &app,
        "POST",
        "/api/agent/a1/poll",
        &agent_headers(),
        Some(json!({})),
    )
    .await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/agent/a2/jobs/{job_id}/result"),
        &agent_headers(),
        Some(json!({"status": "success"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let snapshot = job_status(&app, &job_id).await;
    assert_eq!(snapshot["status"], "dispatched");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = secured_app();

    let (status, _) = send(
        &app,
        "GET",
        "/api/remote/jobs/no-such-job",
        &cloud_headers(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/api/agent/a1/jobs/no-such-job/result",
        &agent_headers(),
        Some(json!({"status": "success"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// AGENT LISTING
// ============================================================================

#[tokio::test]
async fn test_enqueue_alone_does_not_register_agent() {
    let app = secured_app();
    enqueue(&app, "ghost", "tv", json!({})).await;

    let (_, body) = send(&app, "GET", "/api/remote/agents", &cloud_headers(), None).await;
    assert_eq!(body["agents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_heartbeat_registers_agent_with_metadata() {
    let app = secured_app();
    enqueue(&app, "kiosk-1", "tv", json!({})).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/agent/kiosk-1/heartbeat",
        &agent_headers(),
        Some(json!({
            "version": "0.1.0",
            "hostname": "lobby-pi",
            "local_backend_url": "http://127.0.0.1:8000"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agent_id"], "kiosk-1");

    let (_, body) = send(&app, "GET", "/api/remote/agents", &cloud_headers(), None).await;
    let agents = body["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["agent_id"], "kiosk-1");
    assert_eq!(agents[0]["version"], "0.1.0");
    assert_eq!(agents[0]["hostname"], "lobby-pi");
    assert_eq!(agents[0]["queue_depth"], 1);
    assert!(agents[0]["last_seen"].is_string());
}
