//! Pre-send validation gate.
//!
//! Composes session health and quota state into a single pass/fail report,
//! consulted before every dispatch attempt. Checks run in a fixed order and
//! short-circuit on the first missing prerequisite: a session with no
//! cookies cannot meaningfully be probed, and a dead session makes the quota
//! question moot. Preflight failures are retriable; the session may be
//! reconnected and quota frees up at the day boundary.

use std::sync::Arc;

use tracing::debug;

use crate::errors::AppResult;
use crate::models::JobType;
use crate::session::SessionClient;

use super::rate_limiter::RateLimiter;

/// Usage fraction at which the quota check starts warning
const QUOTA_WARN_PERCENT: i64 = 80;

/// Aggregated result of the preflight gate
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct PreflightChecker {
    session: Arc<dyn SessionClient>,
    rate_limiter: RateLimiter,
}

impl PreflightChecker {
    pub fn new(session: Arc<dyn SessionClient>, rate_limiter: RateLimiter) -> Self {
        Self {
            session,
            rate_limiter,
        }
    }

    /// Run the ordered checks for one user and channel.
    pub async fn run(&self, user_id: &str, job_type: JobType) -> AppResult<PreflightReport> {
        let mut report = PreflightReport::default();

        // 1. Extension/bridge connectivity
        let health = match self.session.health(user_id).await {
            Ok(health) => health,
            Err(e) => {
                report.errors.push(format!("Session bridge unreachable: {e}"));
                return Ok(report);
            }
        };
        if !health.connected {
            report
                .errors
                .push(format!("No active extension connection for user {user_id}"));
            return Ok(report);
        }

        // 2. Session cookies
        if !health.has_cookies {
            report
                .errors
                .push("Session cookies are missing; reconnect the extension".to_string());
            return Ok(report);
        }

        // 3. Live validity probe, when the bridge ran one
        if health.valid == Some(false) {
            report
                .errors
                .push("Session is no longer valid; re-authentication required".to_string());
            return Ok(report);
        }

        // 4. Daily quota for this channel
        let quota = self.rate_limiter.can_send(user_id, job_type).await?;
        if !quota.allowed {
            report.errors.push(
                quota
                    .reason
                    .unwrap_or_else(|| format!("Daily limit reached ({}/{})", quota.used, quota.limit)),
            );
        } else if quota.limit > 0 && quota.used * 100 >= quota.limit * QUOTA_WARN_PERCENT {
            report.warnings.push(format!(
                "Daily quota nearly exhausted ({}/{})",
                quota.used, quota.limit
            ));
        }

        report.passed = report.errors.is_empty();
        debug!(
            "Preflight for user {} ({}): passed={} errors={} warnings={}",
            user_id,
            job_type,
            report.passed,
            report.errors.len(),
            report.warnings.len()
        );
        Ok(report)
    }
}
