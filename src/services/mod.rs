//! Pipeline services: quota gating, preflight, retry policy, the per-job
//! state machine, and the periodic queue sweeps.

pub mod preflight;
pub mod processor;
pub mod rate_limiter;
pub mod retry;
pub mod sweeper;

pub use preflight::{PreflightChecker, PreflightReport};
pub use processor::{JobProcessor, ProcessOutcome};
pub use rate_limiter::{QuotaDecision, RateLimiter};
pub use retry::{RetryDecision, RetryPolicy};
pub use sweeper::QueueSweeper;
