use chrono::Utc;
use sqlx::Row;

use super::Database;
use crate::config::QuotaConfig;
use crate::errors::AppResult;
use crate::models::{JobType, UserSettings};
use crate::utils::datetime::DateTimeParser;

fn settings_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<UserSettings> {
    let created_at = row.get::<String, _>("created_at");
    let updated_at = row.get::<String, _>("updated_at");

    Ok(UserSettings {
        user_id: row.get("user_id"),
        daily_connection_limit: row.get("daily_connection_limit"),
        daily_message_limit: row.get("daily_message_limit"),
        connections_sent_today: row.get("connections_sent_today"),
        messages_sent_today: row.get("messages_sent_today"),
        last_limit_reset: row.get("last_limit_reset"),
        created_at: DateTimeParser::parse_flexible(&created_at)?,
        updated_at: DateTimeParser::parse_flexible(&updated_at)?,
    })
}

impl Database {
    /// Fetch a user's quota settings, creating a row with the configured
    /// defaults on first contact. INSERT OR IGNORE keeps concurrent first
    /// contacts race-free.
    pub async fn get_or_create_user_settings(
        &self,
        user_id: &str,
        defaults: &QuotaConfig,
    ) -> AppResult<UserSettings> {
        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO user_settings
             (user_id, daily_connection_limit, daily_message_limit,
              connections_sent_today, messages_sent_today, last_limit_reset,
              created_at, updated_at)
             VALUES (?, ?, ?, 0, 0, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(defaults.default_daily_connection_limit)
        .bind(defaults.default_daily_message_limit)
        .bind(DateTimeParser::format_date(&now))
        .bind(DateTimeParser::format_for_storage(&now))
        .bind(DateTimeParser::format_for_storage(&now))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT user_id, daily_connection_limit, daily_message_limit,
                    connections_sent_today, messages_sent_today, last_limit_reset,
                    created_at, updated_at
             FROM user_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        settings_from_row(&row)
    }

    /// Zero both daily counters when the stored reset date is not today.
    ///
    /// The boundary is a calendar-date string comparison, not an elapsed-time
    /// window. Returns true when a reset actually happened.
    pub async fn reset_daily_counters_if_stale(
        &self,
        user_id: &str,
        today: &str,
    ) -> AppResult<bool> {
        let now = DateTimeParser::format_for_storage(&Utc::now());
        let result = sqlx::query(
            "UPDATE user_settings
             SET connections_sent_today = 0, messages_sent_today = 0,
                 last_limit_reset = ?, updated_at = ?
             WHERE user_id = ? AND last_limit_reset <> ?",
        )
        .bind(today)
        .bind(&now)
        .bind(user_id)
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Bump the daily counter for the job's channel. The increment happens
    /// in SQL so concurrent successful sends cannot lose updates.
    pub async fn increment_daily_count(&self, user_id: &str, job_type: JobType) -> AppResult<()> {
        let column = match job_type {
            JobType::ConnectionRequest => "connections_sent_today",
            JobType::DirectMessage => "messages_sent_today",
        };
        let now = DateTimeParser::format_for_storage(&Utc::now());
        sqlx::query(&format!(
            "UPDATE user_settings SET {column} = {column} + 1, updated_at = ? WHERE user_id = ?"
        ))
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
