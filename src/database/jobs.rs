use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::*;
use crate::utils::datetime::DateTimeParser;

const JOB_COLUMNS: &str = "id, user_id, contact_id, campaign_id, job_type, status, \
     target_profile_url, message, personalized_message, retry_count, next_retry_at, \
     error_code, error_message, send_verified, webhook_received, provider_ref, \
     created_at, updated_at, completed_at";

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<OutreachJob> {
    let id_str = row.get::<String, _>("id");
    let next_retry_at = row.get::<Option<String>, _>("next_retry_at");
    let created_at = row.get::<String, _>("created_at");
    let updated_at = row.get::<String, _>("updated_at");
    let completed_at = row.get::<Option<String>, _>("completed_at");

    Ok(OutreachJob {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| AppError::internal(format!("invalid job id '{id_str}': {e}")))?,
        user_id: row.get("user_id"),
        contact_id: row.get("contact_id"),
        campaign_id: row.get("campaign_id"),
        job_type: row.get("job_type"),
        status: row.get("status"),
        target_profile_url: row.get("target_profile_url"),
        message: row.get("message"),
        personalized_message: row.get("personalized_message"),
        retry_count: row.get("retry_count"),
        next_retry_at: next_retry_at
            .map(|s| DateTimeParser::parse_flexible(&s))
            .transpose()?,
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
        send_verified: row.get("send_verified"),
        webhook_received: row.get("webhook_received"),
        provider_ref: row.get("provider_ref"),
        created_at: DateTimeParser::parse_flexible(&created_at)?,
        updated_at: DateTimeParser::parse_flexible(&updated_at)?,
        completed_at: completed_at
            .map(|s| DateTimeParser::parse_flexible(&s))
            .transpose()?,
    })
}

impl Database {
    /// Accept a new job into the pipeline.
    ///
    /// The job row and the seed `job_created` audit entry are written in one
    /// transaction so no job ever exists without a trail.
    pub async fn queue_job(&self, request: &JobCreateRequest) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let now = DateTimeParser::format_for_storage(&Utc::now());

        let mut transaction = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO outreach_jobs
             (id, user_id, contact_id, campaign_id, job_type, status, target_profile_url,
              message, personalized_message, retry_count, send_verified, webhook_received,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?, 0, 0, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&request.user_id)
        .bind(&request.contact_id)
        .bind(&request.campaign_id)
        .bind(request.job_type)
        .bind(&request.target_profile_url)
        .bind(&request.message)
        .bind(&request.personalized_message)
        .bind(&now)
        .bind(&now)
        .execute(&mut *transaction)
        .await?;

        sqlx::query(
            "INSERT INTO job_audit_events (job_id, seq, event, details, created_at)
             VALUES (?, 1, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(AuditEvent::JobCreated.as_str())
        .bind(
            serde_json::json!({
                "job_type": request.job_type,
                "contact_id": request.contact_id,
            })
            .to_string(),
        )
        .bind(&now)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;

        info!(
            "Queued {} job {} for user {}",
            request.job_type, id, request.user_id
        );
        Ok(id)
    }

    pub async fn get_job(&self, job_id: Uuid) -> AppResult<Option<OutreachJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM outreach_jobs WHERE id = ?"
        ))
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(job_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Check-and-set claim before processing.
    ///
    /// Moves the job to `processing` only if it is still startable, so two
    /// sweeps racing on the same job produce exactly one winner. Returns
    /// false when the claim was lost or the job is not in a startable state.
    pub async fn claim_for_processing(&self, job_id: Uuid) -> AppResult<bool> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        let result = sqlx::query(
            "UPDATE outreach_jobs
             SET status = 'processing', updated_at = ?
             WHERE id = ? AND status IN ('pending', 'retry')",
        )
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Confirmed delivery: terminal success.
    pub async fn mark_sent(&self, job_id: Uuid, provider_ref: Option<&str>) -> AppResult<()> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        sqlx::query(
            "UPDATE outreach_jobs
             SET status = 'sent', send_verified = 1, completed_at = ?, updated_at = ?,
                 provider_ref = COALESCE(?, provider_ref),
                 error_code = NULL, error_message = NULL, next_retry_at = NULL
             WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(provider_ref)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Provisional accept: the provider took the send without confirming it.
    ///
    /// `updated_at` doubles as the queued-at marker the reconciliation sweep
    /// measures its threshold against.
    pub async fn mark_queued(&self, job_id: Uuid, provider_ref: Option<&str>) -> AppResult<()> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        sqlx::query(
            "UPDATE outreach_jobs
             SET status = 'queued', updated_at = ?,
                 provider_ref = COALESCE(?, provider_ref)
             WHERE id = ?",
        )
        .bind(&now)
        .bind(provider_ref)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Schedule the next attempt. The retry counter is incremented in SQL so
    /// concurrent writers cannot lose an increment.
    ///
    /// Conditional on the job still being `processing`: a stale-attempt
    /// rescue racing a slow-but-completing attempt must not drag a settled
    /// job backward. Returns false when the job was settled elsewhere.
    pub async fn schedule_retry(
        &self,
        job_id: Uuid,
        error_code: JobErrorCode,
        error_message: &str,
        next_retry_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        let result = sqlx::query(
            "UPDATE outreach_jobs
             SET status = 'retry', retry_count = retry_count + 1, next_retry_at = ?,
                 error_code = ?, error_message = ?, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(DateTimeParser::format_for_storage(&next_retry_at))
        .bind(error_code)
        .bind(error_message)
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Terminal failure after the retry ceiling. The final error is preserved
    /// verbatim for operator diagnosis. Conditional on `processing` for the
    /// same reason as [`Database::schedule_retry`].
    pub async fn move_to_dead_letter(
        &self,
        job_id: Uuid,
        error_code: JobErrorCode,
        error_message: &str,
    ) -> AppResult<bool> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        let result = sqlx::query(
            "UPDATE outreach_jobs
             SET status = 'dead_letter', error_code = ?, error_message = ?,
                 next_retry_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(error_code)
        .bind(error_message)
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Manual dead-letter recovery: back to `pending` with a fresh retry
    /// budget. Conditional on the job still being dead-lettered.
    pub async fn reset_for_manual_retry(&self, job_id: Uuid) -> AppResult<bool> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        let result = sqlx::query(
            "UPDATE outreach_jobs
             SET status = 'pending', retry_count = 0, next_retry_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'dead_letter'",
        )
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Promote a provisionally queued job to confirmed-sent. Conditional on
    /// the job still being `queued` so the webhook and the reconciliation
    /// sweep racing on the same job produce one winner.
    pub async fn promote_queued_to_sent(&self, job_id: Uuid) -> AppResult<bool> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        let result = sqlx::query(
            "UPDATE outreach_jobs
             SET status = 'sent', send_verified = 1, completed_at = ?, updated_at = ?,
                 error_code = NULL, error_message = NULL, next_retry_at = NULL
             WHERE id = ? AND status = 'queued'",
        )
        .bind(&now)
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the external confirmation signal. Deliberately does not touch
    /// `updated_at`: that column anchors the reconciliation threshold.
    pub async fn mark_webhook_received(
        &self,
        job_id: Uuid,
        provider_ref: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE outreach_jobs
             SET webhook_received = 1, provider_ref = COALESCE(?, provider_ref)
             WHERE id = ?",
        )
        .bind(provider_ref)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_pending_jobs(&self, limit: i64) -> AppResult<Vec<OutreachJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM outreach_jobs
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(job_from_row(&row)?);
        }
        Ok(jobs)
    }

    pub async fn list_due_retry_jobs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<OutreachJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM outreach_jobs
             WHERE status = 'retry' AND next_retry_at IS NOT NULL AND next_retry_at <= ?
             ORDER BY next_retry_at ASC
             LIMIT ?"
        ))
        .bind(DateTimeParser::format_for_storage(&now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(job_from_row(&row)?);
        }
        Ok(jobs)
    }

    /// Queued jobs eligible for reconciliation: unconfirmed ones older than
    /// the cutoff, plus any whose webhook landed while the job was still
    /// mid-flight and so was never promoted by the webhook handler.
    pub async fn list_reconcilable_queued_jobs(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<OutreachJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM outreach_jobs
             WHERE status = 'queued' AND (webhook_received = 1 OR updated_at <= ?)
             ORDER BY updated_at ASC
             LIMIT ?"
        ))
        .bind(DateTimeParser::format_for_storage(&cutoff))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(job_from_row(&row)?);
        }
        Ok(jobs)
    }

    pub async fn list_dead_letter_jobs(&self, user_id: &str) -> AppResult<Vec<OutreachJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM outreach_jobs
             WHERE user_id = ? AND status = 'dead_letter'
             ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(job_from_row(&row)?);
        }
        Ok(jobs)
    }

    /// Jobs stuck in `processing` past the cutoff.
    ///
    /// A crash between the claim and the outcome write leaves the row in
    /// `processing` forever; there is no in-flight abort, so the
    /// reconciliation sweep picks these up and routes them through the
    /// normal retry-or-dead-letter branch.
    pub async fn list_stale_processing_jobs(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<OutreachJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM outreach_jobs
             WHERE status = 'processing' AND updated_at <= ?
             ORDER BY updated_at ASC
             LIMIT ?"
        ))
        .bind(DateTimeParser::format_for_storage(&cutoff))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(job_from_row(&row)?);
        }
        Ok(jobs)
    }

    /// Append one entry to the job's append-only audit trail.
    ///
    /// The sequence number is assigned inside the INSERT itself; SQLite
    /// serializes writers, so two appenders cannot claim the same `seq`.
    /// Existing entries are never updated or deleted.
    pub async fn append_audit(
        &self,
        job_id: Uuid,
        event: AuditEvent,
        details: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        sqlx::query(
            "INSERT INTO job_audit_events (job_id, seq, event, details, created_at)
             SELECT ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?
             FROM job_audit_events WHERE job_id = ?",
        )
        .bind(job_id.to_string())
        .bind(event.as_str())
        .bind(details.map(|d| d.to_string()))
        .bind(&now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_audit_trail(&self, job_id: Uuid) -> AppResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT seq, event, details, created_at FROM job_audit_events
             WHERE job_id = ?
             ORDER BY seq ASC",
        )
        .bind(job_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::new();
        for row in rows {
            let details_str = row.get::<Option<String>, _>("details");
            let created_at = row.get::<String, _>("created_at");
            entries.push(AuditEntry {
                seq: row.get("seq"),
                event: row.get("event"),
                details: details_str.map(|s| serde_json::from_str(&s)).transpose()?,
                created_at: DateTimeParser::parse_flexible(&created_at)?,
            });
        }
        Ok(entries)
    }

    pub async fn job_stats(&self, user_id: &str) -> AppResult<JobStats> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM outreach_jobs
             WHERE user_id = ?
             GROUP BY status",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: JobStatus = row.get("status");
            let count: i64 = row.get("count");
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Processing => stats.processing = count,
                JobStatus::Queued => stats.queued = count,
                JobStatus::Retry => stats.retry = count,
                JobStatus::Sent => stats.sent = count,
                JobStatus::DeadLetter => stats.dead_letter = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }
}
