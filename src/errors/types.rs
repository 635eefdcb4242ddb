//! Error type definitions for the outreach relay.
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use thiserror::Error;
use uuid::Uuid;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the application.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Job state machine and ownership errors
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Session bridge connectivity errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Datetime parsing errors from stored rows
    #[error("Datetime error: {0}")]
    DateTime(#[from] crate::utils::datetime::DateTimeError),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Job pipeline specific errors
#[derive(Error, Debug)]
pub enum JobError {
    /// Job does not exist
    #[error("Job not found: {job_id}")]
    NotFound { job_id: Uuid },

    /// Operation attempted against a job in the wrong state
    #[error("Job {job_id} is '{status}', expected {expected}")]
    InvalidState {
        job_id: Uuid,
        status: String,
        expected: String,
    },

    /// Job belongs to a different user
    #[error("Job {job_id} does not belong to user {user_id}")]
    NotOwner { job_id: Uuid, user_id: String },
}

/// Session bridge connectivity errors (health checks, transport)
#[derive(Error, Debug)]
pub enum SessionError {
    /// Bridge could not be reached at all
    #[error("Session bridge unreachable: {message}")]
    Unreachable { message: String },

    /// Bridge answered with a non-success HTTP status
    #[error("Session bridge returned {status}: {message}")]
    BadResponse { status: u16, message: String },

    /// Bridge answered with a body we could not interpret
    #[error("Invalid response from session bridge: {message}")]
    InvalidResponse { message: String },
}

/// Classified dispatch failures reported by the session bridge
///
/// These drive the retry and dead-letter decisions, so every send failure
/// must land in exactly one variant.
#[derive(Error, Debug)]
pub enum SessionSendError {
    /// Provider throttled the session
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// Session cookies expired or the session was revoked mid-send
    #[error("Session invalid: {message}")]
    SessionInvalid { message: String },

    /// Any other provider or transport failure
    #[error("API error: {message}")]
    Api { status: Option<u16>, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl SessionSendError {
    /// Create a rate limited error
    pub fn rate_limited<M: Into<String>>(message: M) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    /// Create a session invalid error
    pub fn session_invalid<M: Into<String>>(message: M) -> Self {
        Self::SessionInvalid {
            message: message.into(),
        }
    }

    /// Create an API error without an HTTP status
    pub fn api<M: Into<String>>(message: M) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }

    /// Create an API error carrying the provider HTTP status
    pub fn api_status<M: Into<String>>(status: u16, message: M) -> Self {
        Self::Api {
            status: Some(status),
            message: message.into(),
        }
    }
}
