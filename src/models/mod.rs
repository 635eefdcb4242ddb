use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;
use uuid::Uuid;

/// Outreach channel a job sends through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ConnectionRequest,
    DirectMessage,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ConnectionRequest => "connection_request",
            JobType::DirectMessage => "direct_message",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of an outreach job
///
/// Jobs only move forward along the transition graph; the single backward
/// edge is manual dead-letter recovery which resets a `dead_letter` job to
/// `pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Queued,
    Retry,
    Sent,
    DeadLetter,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Queued => "queued",
            JobStatus::Retry => "retry",
            JobStatus::Sent => "sent",
            JobStatus::DeadLetter => "dead_letter",
        }
    }

    /// Terminal states are immutable except for manual dead-letter recovery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::DeadLetter)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified failure code preserved on the job row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobErrorCode {
    /// Session or quota gating failed before dispatch
    PreflightFailed,
    /// Provider throttling signal
    RateLimited,
    /// Session expired or was revoked
    SessionInvalid,
    /// Any other dispatch failure
    ApiError,
}

impl JobErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorCode::PreflightFailed => "PREFLIGHT_FAILED",
            JobErrorCode::RateLimited => "RATE_LIMITED",
            JobErrorCode::SessionInvalid => "SESSION_INVALID",
            JobErrorCode::ApiError => "API_ERROR",
        }
    }
}

impl fmt::Display for JobErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit trail event names
///
/// Stored as text in the append-only `job_audit_events` table. Every status
/// transition and attempt appends exactly one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    JobCreated,
    ProcessingStarted,
    PreflightFailed,
    SendFailed,
    RetryScheduled,
    MovedToDeadLetter,
    SentSuccessfully,
    SendAccepted,
    SendConfirmed,
    ManualRetryRequested,
    ProcessingError,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::JobCreated => "job_created",
            AuditEvent::ProcessingStarted => "processing_started",
            AuditEvent::PreflightFailed => "preflight_failed",
            AuditEvent::SendFailed => "send_failed",
            AuditEvent::RetryScheduled => "retry_scheduled",
            AuditEvent::MovedToDeadLetter => "moved_to_dead_letter",
            AuditEvent::SentSuccessfully => "sent_successfully",
            AuditEvent::SendAccepted => "send_accepted",
            AuditEvent::SendConfirmed => "send_confirmed",
            AuditEvent::ManualRetryRequested => "manual_retry_requested",
            AuditEvent::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One outreach send attempt lineage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachJob {
    pub id: Uuid,
    pub user_id: String,
    pub contact_id: String,
    pub campaign_id: Option<String>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub target_profile_url: String,
    pub message: String,
    pub personalized_message: Option<String>,
    pub retry_count: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_code: Option<JobErrorCode>,
    pub error_message: Option<String>,
    pub send_verified: bool,
    pub webhook_received: bool,
    pub provider_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OutreachJob {
    /// The text actually dispatched: the personalized variant when one was
    /// produced upstream, otherwise the campaign message.
    pub fn effective_message(&self) -> &str {
        self.personalized_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.message)
    }
}

/// One entry in a job's append-only audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: i64,
    pub event: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Per-user quota settings and daily counters
///
/// `last_limit_reset` holds a UTC calendar date (`YYYY-MM-DD`); the reset
/// boundary is a date comparison, not a rolling 24h window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub daily_connection_limit: i64,
    pub daily_message_limit: i64,
    pub connections_sent_today: i64,
    pub messages_sent_today: i64,
    pub last_limit_reset: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    /// Counter and limit for the given channel.
    pub fn channel_usage(&self, job_type: JobType) -> (i64, i64) {
        match job_type {
            JobType::ConnectionRequest => (self.connections_sent_today, self.daily_connection_limit),
            JobType::DirectMessage => (self.messages_sent_today, self.daily_message_limit),
        }
    }
}

/// Record of one confirmed outbound message, written exactly once per job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachMessage {
    pub id: Uuid,
    pub job_id: Uuid,
    pub user_id: String,
    pub contact_id: String,
    pub message_type: JobType,
    pub content: String,
    pub provider_ref: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Job counts grouped by status for the operator dashboard
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobStats {
    pub pending: i64,
    pub processing: i64,
    pub queued: i64,
    pub retry: i64,
    pub sent: i64,
    pub dead_letter: i64,
    pub total: i64,
}

/// Payload accepted at the job submission entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreateRequest {
    pub user_id: String,
    pub contact_id: String,
    pub campaign_id: Option<String>,
    pub job_type: JobType,
    pub target_profile_url: String,
    pub message: String,
    pub personalized_message: Option<String>,
}

fn profile_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/(?:in|pub|profile|sales|company)/[^/\s]+/?$").expect("static pattern")
    })
}

impl JobCreateRequest {
    /// Structural validation before the job is accepted into the pipeline.
    ///
    /// Returns all problems at once so the caller can report them together.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.user_id.trim().is_empty() {
            errors.push("user_id must not be empty".to_string());
        }
        if self.contact_id.trim().is_empty() {
            errors.push("contact_id must not be empty".to_string());
        }
        if self.message.trim().is_empty() {
            errors.push("message must not be empty".to_string());
        }

        match Url::parse(&self.target_profile_url) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    errors.push(format!(
                        "target_profile_url has unsupported scheme '{}'",
                        url.scheme()
                    ));
                } else if url.host_str().is_none() {
                    errors.push("target_profile_url is missing a host".to_string());
                } else if !profile_path_regex().is_match(url.path()) {
                    errors.push(format!(
                        "target_profile_url path '{}' does not look like a profile",
                        url.path()
                    ));
                }
            }
            Err(e) => {
                errors.push(format!("target_profile_url is not a valid URL: {e}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Body for the manual dead-letter retry endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryJobRequest {
    pub user_id: String,
}

/// Body for the external send-confirmation webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfirmation {
    pub job_id: Uuid,
    pub provider_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> JobCreateRequest {
        JobCreateRequest {
            user_id: "user-1".to_string(),
            contact_id: "contact-9".to_string(),
            campaign_id: Some("camp-3".to_string()),
            job_type: JobType::ConnectionRequest,
            target_profile_url: "https://www.linkedin.com/in/some-person/".to_string(),
            message: "Hi, let's connect".to_string(),
            personalized_message: None,
        }
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(JobStatus::Sent.is_terminal());
        assert!(JobStatus::DeadLetter.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Retry.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(JobStatus::DeadLetter.as_str(), "dead_letter");
        assert_eq!(JobType::ConnectionRequest.as_str(), "connection_request");
        assert_eq!(JobErrorCode::RateLimited.as_str(), "RATE_LIMITED");
        assert_eq!(AuditEvent::MovedToDeadLetter.as_str(), "moved_to_dead_letter");
    }

    #[test]
    fn test_serde_forms_match_storage_forms() {
        let status = serde_json::to_string(&JobStatus::DeadLetter).unwrap();
        assert_eq!(status, "\"dead_letter\"");
        let code = serde_json::to_string(&JobErrorCode::PreflightFailed).unwrap();
        assert_eq!(code, "\"PREFLIGHT_FAILED\"");
        let parsed: JobType = serde_json::from_str("\"direct_message\"").unwrap();
        assert_eq!(parsed, JobType::DirectMessage);
    }

    #[test]
    fn test_validate_accepts_profile_urls() {
        assert!(valid_request().validate().is_ok());

        let mut req = valid_request();
        req.target_profile_url = "https://example.com/profile/jane".to_string();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut req = valid_request();
        req.target_profile_url = "not a url".to_string();
        assert!(req.validate().is_err());

        req = valid_request();
        req.target_profile_url = "ftp://example.com/in/jane".to_string();
        let errors = req.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unsupported scheme")));

        req = valid_request();
        req.target_profile_url = "https://example.com/feed".to_string();
        let errors = req.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("does not look like a profile")));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let req = JobCreateRequest {
            user_id: "  ".to_string(),
            contact_id: String::new(),
            campaign_id: None,
            job_type: JobType::DirectMessage,
            target_profile_url: "nope".to_string(),
            message: String::new(),
            personalized_message: None,
        };
        let errors = req.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_effective_message_prefers_personalized() {
        let mut job = OutreachJob {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            contact_id: "contact-1".to_string(),
            campaign_id: None,
            job_type: JobType::DirectMessage,
            status: JobStatus::Pending,
            target_profile_url: "https://example.com/in/jane".to_string(),
            message: "template text".to_string(),
            personalized_message: Some("hand-tuned text".to_string()),
            retry_count: 0,
            next_retry_at: None,
            error_code: None,
            error_message: None,
            send_verified: false,
            webhook_received: false,
            provider_ref: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        assert_eq!(job.effective_message(), "hand-tuned text");

        job.personalized_message = Some("   ".to_string());
        assert_eq!(job.effective_message(), "template text");

        job.personalized_message = None;
        assert_eq!(job.effective_message(), "template text");
    }

    #[test]
    fn test_channel_usage_selects_counter() {
        let settings = UserSettings {
            user_id: "user-1".to_string(),
            daily_connection_limit: 20,
            daily_message_limit: 50,
            connections_sent_today: 3,
            messages_sent_today: 7,
            last_limit_reset: "2024-01-01".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(settings.channel_usage(JobType::ConnectionRequest), (3, 20));
        assert_eq!(settings.channel_usage(JobType::DirectMessage), (7, 50));
    }
}
