//! Session bridge abstraction.
//!
//! Every provider interaction happens inside a user's browser session, fronted
//! by a local bridge service. The pipeline only ever talks to the bridge
//! through the [`SessionClient`] trait so the processor can be exercised with
//! a scripted client in tests.

pub mod bridge;

pub use bridge::BridgeSessionClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{SessionError, SessionSendError};

/// Health snapshot for one user's session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHealth {
    /// Bridge has an active extension connection for this user
    pub connected: bool,
    /// Session cookies are present on the bridge side
    pub has_cookies: bool,
    /// Outcome of the live validity probe, when the bridge ran one
    pub valid: Option<bool>,
}

impl SessionHealth {
    /// A session the bridge knows nothing about
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            has_cookies: false,
            valid: None,
        }
    }
}

/// Result of a dispatch the provider did not reject
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Provider confirmed delivery synchronously
    Delivered { provider_ref: Option<String> },
    /// Provider accepted the send without confirming it; the job waits in
    /// `queued` until a confirmation webhook or the reconciliation sweep
    /// settles it
    Accepted,
}

/// Narrow interface to the session-mediated provider channel
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Probe session health ahead of a dispatch attempt.
    async fn health(&self, user_id: &str) -> Result<SessionHealth, SessionError>;

    /// Send a connection request, optionally carrying a note.
    async fn send_connection_request(
        &self,
        user_id: &str,
        profile_url: &str,
        note: Option<&str>,
    ) -> Result<DispatchOutcome, SessionSendError>;

    /// Send a direct message to an existing connection.
    async fn send_direct_message(
        &self,
        user_id: &str,
        profile_url: &str,
        message: &str,
    ) -> Result<DispatchOutcome, SessionSendError>;
}
