//! Per-user daily send quotas.
//!
//! Counters live in the user settings store and reset lazily on the first
//! touch of a new UTC calendar day. The reset boundary is a date-string
//! comparison, not a rolling 24-hour window.

use chrono::Utc;

use crate::config::QuotaConfig;
use crate::database::Database;
use crate::errors::AppResult;
use crate::models::{JobType, UserSettings};
use crate::utils::datetime::DateTimeParser;

/// Outcome of a quota check for one channel
#[derive(Debug, Clone)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Human-readable denial reason, carrying both counter and limit
    pub reason: Option<String>,
    pub used: i64,
    pub limit: i64,
}

#[derive(Clone)]
pub struct RateLimiter {
    database: Database,
    defaults: QuotaConfig,
}

impl RateLimiter {
    pub fn new(database: Database, defaults: QuotaConfig) -> Self {
        Self { database, defaults }
    }

    /// Load the user's settings, zeroing the daily counters first when the
    /// stored reset date is not today.
    pub async fn check_and_reset_daily_limits(&self, user_id: &str) -> AppResult<UserSettings> {
        let settings = self
            .database
            .get_or_create_user_settings(user_id, &self.defaults)
            .await?;

        let today = DateTimeParser::format_date(&Utc::now());
        if settings.last_limit_reset != today {
            self.database
                .reset_daily_counters_if_stale(user_id, &today)
                .await?;
            return self
                .database
                .get_or_create_user_settings(user_id, &self.defaults)
                .await;
        }

        Ok(settings)
    }

    /// Decide whether one more send on the given channel fits today's quota.
    pub async fn can_send(&self, user_id: &str, job_type: JobType) -> AppResult<QuotaDecision> {
        let settings = self.check_and_reset_daily_limits(user_id).await?;
        let (used, limit) = settings.channel_usage(job_type);

        if used >= limit {
            let channel = match job_type {
                JobType::ConnectionRequest => "connection request",
                JobType::DirectMessage => "direct message",
            };
            return Ok(QuotaDecision {
                allowed: false,
                reason: Some(format!(
                    "Daily {channel} limit reached ({used}/{limit})"
                )),
                used,
                limit,
            });
        }

        Ok(QuotaDecision {
            allowed: true,
            reason: None,
            used,
            limit,
        })
    }

    /// Count one accepted send against today's quota. Called only after the
    /// provider has taken the send.
    pub async fn increment_daily_count(&self, user_id: &str, job_type: JobType) -> AppResult<()> {
        self.database.increment_daily_count(user_id, job_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    async fn limiter() -> RateLimiter {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        };
        let db = Database::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        RateLimiter::new(
            db,
            QuotaConfig {
                default_daily_connection_limit: 2,
                default_daily_message_limit: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_can_send_under_limit() {
        let limiter = limiter().await;
        let decision = limiter
            .can_send("user-1", JobType::ConnectionRequest)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert!(decision.reason.is_none());
        assert_eq!(decision.used, 0);
        assert_eq!(decision.limit, 2);
    }

    #[tokio::test]
    async fn test_can_send_denies_at_limit_with_counts_in_reason() {
        let limiter = limiter().await;
        limiter.check_and_reset_daily_limits("user-1").await.unwrap();
        limiter
            .increment_daily_count("user-1", JobType::ConnectionRequest)
            .await
            .unwrap();
        limiter
            .increment_daily_count("user-1", JobType::ConnectionRequest)
            .await
            .unwrap();

        let decision = limiter
            .can_send("user-1", JobType::ConnectionRequest)
            .await
            .unwrap();
        assert!(!decision.allowed);
        let reason = decision.reason.unwrap();
        assert!(reason.contains("2/2"), "reason was: {reason}");

        // The other channel is untouched
        let messages = limiter
            .can_send("user-1", JobType::DirectMessage)
            .await
            .unwrap();
        assert!(messages.allowed);
    }

    #[tokio::test]
    async fn test_stale_reset_date_zeroes_counters() {
        let limiter = limiter().await;
        limiter.check_and_reset_daily_limits("user-1").await.unwrap();
        limiter
            .increment_daily_count("user-1", JobType::DirectMessage)
            .await
            .unwrap();

        // Force a stale reset stamp, as if the row survived a day boundary
        sqlx::query("UPDATE user_settings SET last_limit_reset = '2000-01-01' WHERE user_id = ?")
            .bind("user-1")
            .execute(&limiter.database.pool())
            .await
            .unwrap();

        let settings = limiter.check_and_reset_daily_limits("user-1").await.unwrap();
        assert_eq!(settings.messages_sent_today, 0);
        assert_eq!(
            settings.last_limit_reset,
            DateTimeParser::format_date(&Utc::now())
        );
    }
}
