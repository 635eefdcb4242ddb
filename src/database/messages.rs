use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{OutreachJob, OutreachMessage};
use crate::utils::datetime::DateTimeParser;

impl Database {
    /// Write the single outreach message record for a delivered job.
    ///
    /// The UNIQUE constraint on `job_id` plus INSERT OR IGNORE make this
    /// exactly-once across retries and racing confirmation paths. Returns
    /// true when this call created the record.
    pub async fn record_outreach_message(
        &self,
        job: &OutreachJob,
        sent_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        let result = sqlx::query(
            "INSERT OR IGNORE INTO outreach_messages
             (id, job_id, user_id, contact_id, message_type, content, provider_ref,
              sent_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(job.id.to_string())
        .bind(&job.user_id)
        .bind(&job.contact_id)
        .bind(job.job_type)
        .bind(job.effective_message())
        .bind(&job.provider_ref)
        .bind(DateTimeParser::format_for_storage(&sent_at))
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_message_for_job(&self, job_id: Uuid) -> AppResult<Option<OutreachMessage>> {
        let row = sqlx::query(
            "SELECT id, job_id, user_id, contact_id, message_type, content, provider_ref,
                    sent_at, created_at
             FROM outreach_messages WHERE job_id = ?",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id_str = row.get::<String, _>("id");
                let job_id_str = row.get::<String, _>("job_id");
                let sent_at = row.get::<String, _>("sent_at");
                let created_at = row.get::<String, _>("created_at");

                Ok(Some(OutreachMessage {
                    id: Uuid::parse_str(&id_str).map_err(|e| {
                        AppError::internal(format!("invalid message id '{id_str}': {e}"))
                    })?,
                    job_id: Uuid::parse_str(&job_id_str).map_err(|e| {
                        AppError::internal(format!("invalid job id '{job_id_str}': {e}"))
                    })?,
                    user_id: row.get("user_id"),
                    contact_id: row.get("contact_id"),
                    message_type: row.get("message_type"),
                    content: row.get("content"),
                    provider_ref: row.get("provider_ref"),
                    sent_at: DateTimeParser::parse_flexible(&sent_at)?,
                    created_at: DateTimeParser::parse_flexible(&created_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn count_messages_for_job(&self, job_id: Uuid) -> AppResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outreach_messages WHERE job_id = ?")
                .bind(job_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
