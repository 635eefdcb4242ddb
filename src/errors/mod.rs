//! Centralized error handling for the outreach relay.
//!
//! Unifies error types across the pipeline layers so services and the web
//! surface can report failures consistently.
//!
//! # Error Categories
//!
//! - **Database Errors**: SQLite operations, migrations, connection issues
//! - **Job Errors**: state machine violations and ownership checks
//! - **Session Errors**: session bridge connectivity and dispatch failures
//! - **Validation Errors**: input validation on job submissions
//!
//! # Usage
//!
//! ```rust
//! use outreach_relay::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     // Function can return any error type that converts to AppError
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
