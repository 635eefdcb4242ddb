//! Retry backoff policy and the dead-letter threshold.
//!
//! Every classified failure walks the same fixed ladder: 30, then 60, then
//! 120 minutes, indexed by the retry count before the increment and capped
//! at the last rung. Once a job has burned three retries the next failure
//! dead-letters it.

use chrono::{DateTime, Duration, Utc};

/// Failed attempts allowed before a job dead-letters
pub const MAX_RETRIES: i64 = 3;

/// Backoff ladder in minutes, indexed by pre-increment retry count
const BACKOFF_MINUTES: [i64; 3] = [30, 60, 120];

/// What to do with a job after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_retry_at: DateTime<Utc> },
    DeadLetter,
}

pub struct RetryPolicy;

impl RetryPolicy {
    /// Delay before the next attempt, given how many retries the job has
    /// already consumed.
    pub fn backoff_delay(retry_count: i64) -> Duration {
        let index = retry_count.clamp(0, BACKOFF_MINUTES.len() as i64 - 1) as usize;
        Duration::minutes(BACKOFF_MINUTES[index])
    }

    /// Retry-or-dead-letter branch taken after every classified failure.
    pub fn decide(retry_count: i64, now: DateTime<Utc>) -> RetryDecision {
        if retry_count < MAX_RETRIES {
            RetryDecision::Retry {
                next_retry_at: now + Self::backoff_delay(retry_count),
            }
        } else {
            RetryDecision::DeadLetter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_values() {
        assert_eq!(RetryPolicy::backoff_delay(0), Duration::minutes(30));
        assert_eq!(RetryPolicy::backoff_delay(1), Duration::minutes(60));
        assert_eq!(RetryPolicy::backoff_delay(2), Duration::minutes(120));
        // Capped at the last rung
        assert_eq!(RetryPolicy::backoff_delay(7), Duration::minutes(120));
    }

    #[test]
    fn test_decide_walks_ladder_then_dead_letters() {
        let now = Utc::now();
        assert_eq!(
            RetryPolicy::decide(0, now),
            RetryDecision::Retry {
                next_retry_at: now + Duration::minutes(30)
            }
        );
        assert_eq!(
            RetryPolicy::decide(2, now),
            RetryDecision::Retry {
                next_retry_at: now + Duration::minutes(120)
            }
        );
        assert_eq!(RetryPolicy::decide(3, now), RetryDecision::DeadLetter);
        assert_eq!(RetryPolicy::decide(10, now), RetryDecision::DeadLetter);
    }
}
