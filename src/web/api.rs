//! API handlers for job submission, polling, confirmations, and the
//! operator surface.
//!
//! Submission is fire-and-forget: the caller gets a job id immediately and
//! polls `GET /api/v1/jobs/{id}`; the periodic sweeps drive the pipeline.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::errors::{AppError, JobError};
use crate::models::{JobCreateRequest, RetryJobRequest, SendConfirmation};

fn job_error_status(error: &AppError) -> StatusCode {
    match error {
        AppError::Job(JobError::NotFound { .. }) => StatusCode::NOT_FOUND,
        AppError::Job(JobError::NotOwner { .. }) => StatusCode::FORBIDDEN,
        AppError::Job(JobError::InvalidState { .. }) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "outreach-relay",
    }))
}

/// The only way new work enters the pipeline.
pub async fn queue_job(
    State(state): State<AppState>,
    Json(request): Json<JobCreateRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if let Err(errors) = request.validate() {
        warn!("Rejected job submission: {}", errors.join("; "));
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))));
    }

    match state.database.queue_job(&request).await {
        Ok(job_id) => Ok((
            StatusCode::CREATED,
            Json(json!({ "job_id": job_id, "status": "pending" })),
        )),
        Err(e) => {
            error!("Failed to queue job: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "errors": ["failed to queue job"] })),
            ))
        }
    }
}

/// Polling surface for submitted jobs.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    match state.database.get_job(id).await {
        Ok(Some(job)) => Ok(Json(json!(job))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to fetch job {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Ordered, append-only audit trail for one job.
pub async fn get_job_audit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    match state.database.get_job(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to fetch job {}: {}", id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    match state.database.get_audit_trail(id).await {
        Ok(entries) => Ok(Json(json!({ "job_id": id, "events": entries }))),
        Err(e) => {
            error!("Failed to fetch audit trail for {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Manual dead-letter recovery. The reset job is returned immediately and a
/// fresh attempt is spawned; the caller polls for its outcome.
pub async fn retry_dead_letter_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RetryJobRequest>,
) -> Result<Json<Value>, StatusCode> {
    match state
        .processor
        .retry_dead_letter_job(id, &request.user_id)
        .await
    {
        Ok(job) => {
            let processor = state.processor.clone();
            tokio::spawn(async move {
                if let Err(e) = processor.process_job(id).await {
                    warn!("Manual retry attempt for job {} failed: {}", id, e);
                }
            });
            Ok(Json(json!(job)))
        }
        Err(e) => {
            warn!("Manual retry rejected for job {}: {}", id, e);
            Err(job_error_status(&e))
        }
    }
}

pub async fn list_dead_letter_jobs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.database.list_dead_letter_jobs(&user_id).await {
        Ok(jobs) => Ok(Json(json!({ "count": jobs.len(), "jobs": jobs }))),
        Err(e) => {
            error!("Failed to list dead-letter jobs for {}: {}", user_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn get_job_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.database.job_stats(&user_id).await {
        Ok(stats) => Ok(Json(json!(stats))),
        Err(e) => {
            error!("Failed to compute job stats for {}: {}", user_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Current quota snapshot, with the lazy daily reset applied.
pub async fn get_quota(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state
        .processor
        .rate_limiter()
        .check_and_reset_daily_limits(&user_id)
        .await
    {
        Ok(settings) => Ok(Json(json!({
            "user_id": settings.user_id,
            "daily_connection_limit": settings.daily_connection_limit,
            "daily_message_limit": settings.daily_message_limit,
            "connections_sent_today": settings.connections_sent_today,
            "messages_sent_today": settings.messages_sent_today,
            "last_limit_reset": settings.last_limit_reset,
        }))),
        Err(e) => {
            error!("Failed to load quota for {}: {}", user_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Send-confirmation webhook from the extension bridge.
///
/// Marks the confirmation flag and, when the job is still provisionally
/// queued, promotes it the same way the reconciliation sweep would.
pub async fn receive_confirmation(
    State(state): State<AppState>,
    Json(confirmation): Json<SendConfirmation>,
) -> Result<Json<Value>, StatusCode> {
    let job_id = confirmation.job_id;

    match state
        .database
        .mark_webhook_received(job_id, confirmation.provider_ref.as_deref())
        .await
    {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to record confirmation for job {}: {}", job_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    match state.processor.confirm_queued_job(job_id, "webhook").await {
        Ok(promoted) => {
            info!(
                "Confirmation received for job {} (promoted: {})",
                job_id, promoted
            );
            Ok(Json(json!({ "job_id": job_id, "promoted": promoted })))
        }
        Err(e) => {
            error!("Failed to settle confirmed job {}: {}", job_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
