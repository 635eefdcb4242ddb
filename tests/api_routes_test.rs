//! Route-level tests for the HTTP surface, driven through
//! `tower::ServiceExt::oneshot` without binding a socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use outreach_relay::config::{Config, DatabaseConfig};
use outreach_relay::database::Database;
use outreach_relay::errors::{SessionError, SessionSendError};
use outreach_relay::models::{JobCreateRequest, JobErrorCode, JobStatus, JobType};
use outreach_relay::services::JobProcessor;
use outreach_relay::session::{DispatchOutcome, SessionClient, SessionHealth};
use outreach_relay::web::{create_router, AppState};

/// Bridge stub: always connected and delivering, so handler logic is what
/// gets exercised.
struct StubClient;

#[async_trait]
impl SessionClient for StubClient {
    async fn health(&self, _user_id: &str) -> Result<SessionHealth, SessionError> {
        Ok(SessionHealth {
            connected: true,
            has_cookies: true,
            valid: Some(true),
        })
    }

    async fn send_connection_request(
        &self,
        _user_id: &str,
        _profile_url: &str,
        _note: Option<&str>,
    ) -> Result<DispatchOutcome, SessionSendError> {
        Ok(DispatchOutcome::Delivered { provider_ref: None })
    }

    async fn send_direct_message(
        &self,
        _user_id: &str,
        _profile_url: &str,
        _message: &str,
    ) -> Result<DispatchOutcome, SessionSendError> {
        Ok(DispatchOutcome::Delivered { provider_ref: None })
    }
}

async fn test_app() -> (Router, Database, JobProcessor) {
    let config = Config::default();
    let db = Database::new(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(1),
    })
    .await
    .unwrap();
    db.migrate().await.unwrap();

    let processor = JobProcessor::new(db.clone(), Arc::new(StubClient), config.quota.clone());
    let app = create_router(AppState {
        database: db.clone(),
        config,
        processor: processor.clone(),
    });
    (app, db, processor)
}

async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = match body {
        Some(json_body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn submission() -> Value {
    json!({
        "user_id": "user-1",
        "contact_id": "contact-1",
        "campaign_id": "camp-1",
        "job_type": "connection_request",
        "target_profile_url": "https://example.com/in/jane",
        "message": "Hi, let's connect",
        "personalized_message": null,
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _db, _processor) = test_app().await;
    let (status, body) = send_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_submit_then_poll_job() {
    let (app, _db, _processor) = test_app().await;

    let (status, body) =
        send_request(&app, Method::POST, "/api/v1/jobs", Some(submission())).await;
    assert_eq!(status, StatusCode::CREATED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) =
        send_request(&app, Method::GET, &format!("/api/v1/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["retry_count"], 0);
    assert_eq!(body["user_id"], "user-1");
}

#[tokio::test]
async fn test_submit_rejects_invalid_payload() {
    let (app, _db, _processor) = test_app().await;

    let mut bad = submission();
    bad["target_profile_url"] = json!("not a url");
    bad["message"] = json!("");

    let (status, body) = send_request(&app, Method::POST, "/api/v1/jobs", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn test_unknown_job_returns_not_found() {
    let (app, _db, _processor) = test_app().await;
    let id = Uuid::new_v4();

    let (status, _) = send_request(&app, Method::GET, &format!("/api/v1/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        send_request(&app, Method::GET, &format!("/api/v1/jobs/{id}/audit"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_endpoint_lists_seeded_event() {
    let (app, _db, _processor) = test_app().await;
    let (_, body) = send_request(&app, Method::POST, "/api/v1/jobs", Some(submission())).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/jobs/{job_id}/audit"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "job_created");
    assert_eq!(events[0]["seq"], 1);
}

#[tokio::test]
async fn test_stats_group_jobs_by_status() {
    let (app, db, _processor) = test_app().await;
    for _ in 0..2 {
        send_request(&app, Method::POST, "/api/v1/jobs", Some(submission())).await;
    }
    // Move one job to sent directly through the store
    let pending = db.list_pending_jobs(10).await.unwrap();
    db.claim_for_processing(pending[0].id).await.unwrap();
    db.mark_sent(pending[0].id, None).await.unwrap();

    let (status, body) = send_request(
        &app,
        Method::GET,
        "/api/v1/users/user-1/jobs/stats",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["sent"], 1);
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn test_quota_endpoint_returns_defaults() {
    let (app, _db, _processor) = test_app().await;
    let (status, body) =
        send_request(&app, Method::GET, "/api/v1/users/user-1/quota", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["daily_connection_limit"], 20);
    assert_eq!(body["daily_message_limit"], 50);
    assert_eq!(body["connections_sent_today"], 0);
}

#[tokio::test]
async fn test_confirmation_webhook_promotes_queued_job() {
    let (app, db, _processor) = test_app().await;
    let (_, body) = send_request(&app, Method::POST, "/api/v1/jobs", Some(submission())).await;
    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    // Provisionally accepted send awaiting confirmation
    db.claim_for_processing(job_id).await.unwrap();
    db.mark_queued(job_id, None).await.unwrap();

    let (status, body) = send_request(
        &app,
        Method::POST,
        "/api/v1/confirmations",
        Some(json!({ "job_id": job_id, "provider_ref": "prov-3" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["promoted"], true);

    let job = db.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert!(job.webhook_received);
    assert_eq!(job.provider_ref.as_deref(), Some("prov-3"));
    assert_eq!(db.count_messages_for_job(job_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_confirmation_for_unknown_job_is_not_found() {
    let (app, _db, _processor) = test_app().await;
    let (status, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/confirmations",
        Some(json!({ "job_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dead_letter_listing_and_manual_retry() {
    let (app, db, _processor) = test_app().await;
    let job_id = db
        .queue_job(&JobCreateRequest {
            user_id: "user-1".to_string(),
            contact_id: "contact-1".to_string(),
            campaign_id: None,
            job_type: JobType::ConnectionRequest,
            target_profile_url: "https://example.com/in/jane".to_string(),
            message: "hello".to_string(),
            personalized_message: None,
        })
        .await
        .unwrap();
    db.claim_for_processing(job_id).await.unwrap();
    db.move_to_dead_letter(job_id, JobErrorCode::ApiError, "exhausted")
        .await
        .unwrap();

    let (status, body) = send_request(
        &app,
        Method::GET,
        "/api/v1/users/user-1/jobs/dead-letter",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["jobs"][0]["error_code"], "API_ERROR");

    // Wrong owner
    let (status, _) = send_request(
        &app,
        Method::POST,
        &format!("/api/v1/jobs/{job_id}/retry"),
        Some(json!({ "user_id": "intruder" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Owner gets the job reset to pending
    let (status, body) = send_request(
        &app,
        Method::POST,
        &format!("/api/v1/jobs/{job_id}/retry"),
        Some(json!({ "user_id": "user-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["retry_count"], 0);

    // Unknown job id
    let (status, _) = send_request(
        &app,
        Method::POST,
        &format!("/api/v1/jobs/{}/retry", Uuid::new_v4()),
        Some(json!({ "user_id": "user-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
