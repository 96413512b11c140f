//! Retry scheduling for failed jobs

use chrono::{DateTime, Duration, Utc};

use crate::error::ImportError;

/// Delay before retry N (1-based); later attempts reuse the last entry
pub const BACKOFF_SECS: [i64; 3] = [30, 120, 300];

pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let index = (attempt.max(1) as usize - 1).min(BACKOFF_SECS.len() - 1);
    Duration::seconds(BACKOFF_SECS[index])
}

/// When the job may run again, or `None` if the failure is final
pub fn next_retry_at(
    error: &ImportError,
    attempts: u32,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !error.retriable || attempts >= max_attempts {
        return None;
    }
    Some(now + backoff_for_attempt(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_for_attempt(1), Duration::seconds(30));
        assert_eq!(backoff_for_attempt(2), Duration::minutes(2));
        assert_eq!(backoff_for_attempt(3), Duration::minutes(5));
        assert_eq!(backoff_for_attempt(9), Duration::minutes(5));
        assert_eq!(backoff_for_attempt(0), Duration::seconds(30));
    }

    #[test]
    fn test_retry_decision() {
        let now = Utc::now();
        let transient = ImportError::transient("network");

        assert_eq!(next_retry_at(&transient, 1, 3, now), Some(now + Duration::seconds(30)));
        assert_eq!(next_retry_at(&transient, 2, 3, now), Some(now + Duration::minutes(2)));
        assert_eq!(next_retry_at(&transient, 3, 3, now), None);
        assert_eq!(next_retry_at(&ImportError::validation("bad"), 1, 3, now), None);
        assert_eq!(next_retry_at(&ImportError::timeout(300), 1, 3, now), None);
    }
}
