//! Lock-contention retry for SQLite writes
//!
//! Job updates, job claims and package transactions compete for the single
//! SQLite writer. A write that hits "database is locked" is repeated with a
//! doubling pause until the wait budget (`database_max_lock_wait_ms`) is
//! spent; any other failure is returned at once.

use std::time::{Duration, Instant};

use chgk_common::Result;

const FIRST_PAUSE_MS: u64 = 10;
const MAX_PAUSE_MS: u64 = 1000;

/// Retries that take longer than this are logged at WARN
const SLOW_RECOVERY_MS: u128 = 2000;

/// Pause schedule: 10, 20, 40 ... capped at one second
#[derive(Debug)]
struct LockBackoff {
    next_ms: u64,
}

impl LockBackoff {
    fn new() -> Self {
        Self {
            next_ms: FIRST_PAUSE_MS,
        }
    }

    fn next_pause(&mut self) -> Duration {
        let pause = Duration::from_millis(self.next_ms);
        self.next_ms = (self.next_ms * 2).min(MAX_PAUSE_MS);
        pause
    }
}

/// Run `operation` until it succeeds, fails with a non-lock error, or
/// `max_wait_ms` has elapsed
///
/// The last lock error is returned unchanged so the caller can still
/// classify it as transient.
pub async fn retry_on_lock<F, Fut, T>(label: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let started = Instant::now();
    let budget = Duration::from_millis(max_wait_ms);
    let mut backoff = LockBackoff::new();
    let mut attempt = 1u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    let waited_ms = started.elapsed().as_millis();
                    if waited_ms > SLOW_RECOVERY_MS {
                        tracing::warn!(operation = label, attempt, waited_ms, "Write went through after long lock wait");
                    } else {
                        tracing::debug!(operation = label, attempt, waited_ms, "Write went through after lock wait");
                    }
                }
                return Ok(value);
            }
            Err(err) if err.is_database_locked() => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= budget {
            tracing::error!(
                operation = label,
                attempt,
                waited_ms = waited.as_millis(),
                max_wait_ms,
                "Database still locked, giving up"
            );
            return Err(err);
        }

        let pause = backoff.next_pause();
        tracing::warn!(
            operation = label,
            attempt,
            pause_ms = pause.as_millis(),
            remaining_ms = budget.saturating_sub(waited).as_millis(),
            "Database locked, retrying"
        );
        tokio::time::sleep(pause).await;
        attempt += 1;
    }
}
