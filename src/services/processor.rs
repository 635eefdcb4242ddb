//! The per-job state machine.
//!
//! One call to [`JobProcessor::process_job`] drives a single attempt:
//! claim → preflight → dispatch → classify → terminal state or retry.
//! Unexpected internal failures (store errors, bridge decode bugs) enter the
//! same retry ladder as classified failures rather than failing fast: a
//! transient infrastructure fault should self-heal the same way a transient
//! provider fault does, and a job stranded in `processing` has no operator
//! surface to recover it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::database::Database;
use crate::errors::{AppResult, JobError, SessionSendError};
use crate::models::{AuditEvent, JobErrorCode, JobStatus, JobType, OutreachJob};
use crate::session::{DispatchOutcome, SessionClient};

use super::preflight::PreflightChecker;
use super::rate_limiter::RateLimiter;
use super::retry::{RetryDecision, RetryPolicy};

/// Where one processing attempt left the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Delivery confirmed synchronously
    Sent,
    /// Provider accepted without confirming; awaiting webhook or reconciliation
    Queued,
    /// Failed, next attempt scheduled
    RetryScheduled,
    /// Failed past the retry ceiling
    DeadLettered,
    /// Another path settled the job before this attempt could write its
    /// failure outcome; nothing was changed
    Superseded,
}

#[derive(Clone)]
pub struct JobProcessor {
    database: Database,
    session: Arc<dyn SessionClient>,
    rate_limiter: RateLimiter,
    preflight: PreflightChecker,
}

fn classify_send_error(error: &SessionSendError) -> JobErrorCode {
    match error {
        SessionSendError::RateLimited { .. } => JobErrorCode::RateLimited,
        SessionSendError::SessionInvalid { .. } => JobErrorCode::SessionInvalid,
        SessionSendError::Api { .. } => JobErrorCode::ApiError,
    }
}

impl JobProcessor {
    pub fn new(database: Database, session: Arc<dyn SessionClient>, quota: QuotaConfig) -> Self {
        let rate_limiter = RateLimiter::new(database.clone(), quota);
        let preflight = PreflightChecker::new(session.clone(), rate_limiter.clone());
        Self {
            database,
            session,
            rate_limiter,
            preflight,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Run one attempt for the given job.
    ///
    /// Only `pending` and `retry` jobs are startable; the claim is a
    /// conditional UPDATE, so two sweeps racing on the same job produce
    /// exactly one attempt and the loser gets an invalid-state error without
    /// having mutated anything.
    pub async fn process_job(&self, job_id: Uuid) -> AppResult<ProcessOutcome> {
        let job = self
            .database
            .get_job(job_id)
            .await?
            .ok_or(JobError::NotFound { job_id })?;

        if !self.database.claim_for_processing(job_id).await? {
            return Err(JobError::InvalidState {
                job_id,
                status: job.status.to_string(),
                expected: "pending or retry".to_string(),
            }
            .into());
        }

        self.database
            .append_audit(
                job_id,
                AuditEvent::ProcessingStarted,
                Some(json!({ "attempt": job.retry_count + 1 })),
            )
            .await?;

        match self.run_attempt(&job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Unexpected failure: record it and take the normal ladder.
                let message = format!("Unexpected processing error: {e}");
                self.database
                    .append_audit(
                        job_id,
                        AuditEvent::ProcessingError,
                        Some(json!({ "error": e.to_string() })),
                    )
                    .await?;
                self.fail_attempt(&job, JobErrorCode::ApiError, &message)
                    .await
            }
        }
    }

    async fn run_attempt(&self, job: &OutreachJob) -> AppResult<ProcessOutcome> {
        let report = self.preflight.run(&job.user_id, job.job_type).await?;
        if !report.passed {
            self.database
                .append_audit(
                    job.id,
                    AuditEvent::PreflightFailed,
                    Some(json!({
                        "errors": report.errors,
                        "warnings": report.warnings,
                    })),
                )
                .await?;
            return self
                .fail_attempt(job, JobErrorCode::PreflightFailed, &report.errors.join("; "))
                .await;
        }

        let dispatch = match job.job_type {
            JobType::ConnectionRequest => {
                self.session
                    .send_connection_request(
                        &job.user_id,
                        &job.target_profile_url,
                        Some(job.effective_message()),
                    )
                    .await
            }
            JobType::DirectMessage => {
                self.session
                    .send_direct_message(
                        &job.user_id,
                        &job.target_profile_url,
                        job.effective_message(),
                    )
                    .await
            }
        };

        match dispatch {
            Ok(DispatchOutcome::Delivered { provider_ref }) => {
                self.database.mark_sent(job.id, provider_ref.as_deref()).await?;
                self.database
                    .append_audit(
                        job.id,
                        AuditEvent::SentSuccessfully,
                        Some(json!({ "provider_ref": provider_ref })),
                    )
                    .await?;
                if let Some(sent) = self.database.get_job(job.id).await? {
                    let sent_at = sent.completed_at.unwrap_or_else(Utc::now);
                    self.database.record_outreach_message(&sent, sent_at).await?;
                }
                self.rate_limiter
                    .increment_daily_count(&job.user_id, job.job_type)
                    .await?;
                info!("Job {} delivered ({})", job.id, job.job_type);
                Ok(ProcessOutcome::Sent)
            }
            Ok(DispatchOutcome::Accepted) => {
                // Provisional acceptance: the provider performed the action,
                // so it counts against today's quota now; the message record
                // waits for confirmation.
                self.database.mark_queued(job.id, None).await?;
                self.database
                    .append_audit(job.id, AuditEvent::SendAccepted, None)
                    .await?;
                self.rate_limiter
                    .increment_daily_count(&job.user_id, job.job_type)
                    .await?;
                info!("Job {} accepted, awaiting confirmation", job.id);
                Ok(ProcessOutcome::Queued)
            }
            Err(send_error) => {
                let error_code = classify_send_error(&send_error);
                let message = send_error.to_string();
                self.database
                    .append_audit(
                        job.id,
                        AuditEvent::SendFailed,
                        Some(json!({
                            "error_code": error_code,
                            "message": message,
                        })),
                    )
                    .await?;
                self.fail_attempt(job, error_code, &message).await
            }
        }
    }

    /// The retry-or-dead-letter branch shared by preflight failures, send
    /// failures, and unexpected errors.
    ///
    /// The transition writers are conditional on the job still being
    /// `processing`; losing that write means another path settled the job
    /// first, and this attempt's failure outcome is dropped.
    async fn fail_attempt(
        &self,
        job: &OutreachJob,
        error_code: JobErrorCode,
        error_message: &str,
    ) -> AppResult<ProcessOutcome> {
        match RetryPolicy::decide(job.retry_count, Utc::now()) {
            RetryDecision::Retry { next_retry_at } => {
                if !self
                    .database
                    .schedule_retry(job.id, error_code, error_message, next_retry_at)
                    .await?
                {
                    debug!("Job {} was settled elsewhere, dropping retry", job.id);
                    return Ok(ProcessOutcome::Superseded);
                }
                self.database
                    .append_audit(
                        job.id,
                        AuditEvent::RetryScheduled,
                        Some(json!({
                            "retry_count": job.retry_count + 1,
                            "error_code": error_code,
                            "next_retry_at": next_retry_at.to_rfc3339(),
                        })),
                    )
                    .await?;
                warn!(
                    "Job {} failed ({}): retry {} scheduled",
                    job.id,
                    error_code,
                    job.retry_count + 1
                );
                Ok(ProcessOutcome::RetryScheduled)
            }
            RetryDecision::DeadLetter => {
                if !self
                    .database
                    .move_to_dead_letter(job.id, error_code, error_message)
                    .await?
                {
                    debug!("Job {} was settled elsewhere, dropping dead-letter", job.id);
                    return Ok(ProcessOutcome::Superseded);
                }
                self.database
                    .append_audit(
                        job.id,
                        AuditEvent::MovedToDeadLetter,
                        Some(json!({
                            "error_code": error_code,
                            "error_message": error_message,
                        })),
                    )
                    .await?;
                error!(
                    "Job {} exhausted retries, dead-lettered ({}): {}",
                    job.id, error_code, error_message
                );
                Ok(ProcessOutcome::DeadLettered)
            }
        }
    }

    /// Settle a provisionally accepted job as delivered.
    ///
    /// Shared by the confirmation webhook and the reconciliation sweep; the
    /// conditional promotion means whichever path arrives second is a no-op.
    /// Returns true when this call performed the promotion.
    pub async fn confirm_queued_job(&self, job_id: Uuid, via: &str) -> AppResult<bool> {
        if !self.database.promote_queued_to_sent(job_id).await? {
            return Ok(false);
        }
        self.database
            .append_audit(job_id, AuditEvent::SendConfirmed, Some(json!({ "via": via })))
            .await?;
        if let Some(job) = self.database.get_job(job_id).await? {
            let sent_at = job.completed_at.unwrap_or_else(Utc::now);
            self.database.record_outreach_message(&job, sent_at).await?;
        }
        info!("Job {} confirmed sent via {}", job_id, via);
        Ok(true)
    }

    /// Route a job abandoned mid-processing through the failure branch.
    ///
    /// The attempt never wrote an outcome (crash or lost task), so it counts
    /// as a failed attempt: `processing → retry` or `processing →
    /// dead_letter`, both forward edges.
    pub async fn recover_stale_job(&self, job: &OutreachJob) -> AppResult<ProcessOutcome> {
        // The stale list is a snapshot; a slow attempt may have finished in
        // the meantime, and a settled job is not rescuable.
        match self.database.get_job(job.id).await? {
            Some(current) if current.status == JobStatus::Processing => {}
            _ => return Ok(ProcessOutcome::Superseded),
        }

        self.database
            .append_audit(
                job.id,
                AuditEvent::ProcessingError,
                Some(json!({ "error": "attempt abandoned mid-processing" })),
            )
            .await?;
        self.fail_attempt(job, JobErrorCode::ApiError, "Attempt abandoned mid-processing")
            .await
    }

    /// Manual dead-letter recovery, from the operator surface.
    ///
    /// Validates ownership and current status, resets the retry budget, and
    /// returns the job to `pending`. The caller decides whether to re-invoke
    /// the processor immediately.
    pub async fn retry_dead_letter_job(
        &self,
        job_id: Uuid,
        user_id: &str,
    ) -> AppResult<OutreachJob> {
        let job = self
            .database
            .get_job(job_id)
            .await?
            .ok_or(JobError::NotFound { job_id })?;

        if job.user_id != user_id {
            return Err(JobError::NotOwner {
                job_id,
                user_id: user_id.to_string(),
            }
            .into());
        }

        if !self.database.reset_for_manual_retry(job_id).await? {
            return Err(JobError::InvalidState {
                job_id,
                status: job.status.to_string(),
                expected: "dead_letter".to_string(),
            }
            .into());
        }

        self.database
            .append_audit(
                job_id,
                AuditEvent::ManualRetryRequested,
                Some(json!({ "requested_by": user_id })),
            )
            .await?;

        info!("Job {} manually reset for retry by {}", job_id, user_id);
        self.database
            .get_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound { job_id }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_send_error() {
        assert_eq!(
            classify_send_error(&SessionSendError::rate_limited("429")),
            JobErrorCode::RateLimited
        );
        assert_eq!(
            classify_send_error(&SessionSendError::session_invalid("expired")),
            JobErrorCode::SessionInvalid
        );
        assert_eq!(
            classify_send_error(&SessionSendError::api_status(502, "bad gateway")),
            JobErrorCode::ApiError
        );
    }
}
