//! Bounded waiting for contended row locks.

use crate::config::WorkDocConfig;
use crate::error::{WorkDocError, WorkDocResult};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{trace, warn};
use workdoc_storage::StorageError;

/// Why [`retry_until_deadline`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt up to the deadline failed transiently.
    TimedOut {
        /// Time spent retrying.
        waited: Duration,
        /// The last transient error.
        last: E,
    },
    /// An attempt failed with a non-transient error.
    Failed(E),
}

/// Repeats `attempt` until it succeeds, fails permanently, or `timeout` elapses.
///
/// Errors for which `is_transient` returns true cause a pause of `pause`
/// (clipped to the remaining time) and another attempt. There is always at
/// least one attempt, and the wait cannot be cancelled.
///
/// # Errors
///
/// Returns [`RetryError::Failed`] on the first non-transient error, or
/// [`RetryError::TimedOut`] once the deadline passes while still failing
/// transiently.
pub fn retry_until_deadline<T, E, F, P>(
    timeout: Duration,
    pause: Duration,
    mut attempt: F,
    is_transient: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                let waited = start.elapsed();
                if waited >= timeout {
                    return Err(RetryError::TimedOut { waited, last: e });
                }
                trace!(attempts, ?waited, "transient failure; retrying");
                thread::sleep(pause.min(timeout - waited));
            }
            Err(e) => return Err(RetryError::Failed(e)),
        }
    }
}

/// Repeats a locking select while the row is locked by another transaction.
///
/// A single attempt returns `Ok(true)` when the row was found and locked,
/// `Ok(false)` when no row matched (not contention), or
/// [`StorageError::RowLocked`] to trigger another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSelector {
    timeout: Duration,
    pause: Duration,
}

impl RowSelector {
    /// Creates a selector with the given bound and pause.
    #[must_use]
    pub const fn new(timeout: Duration, pause: Duration) -> Self {
        Self { timeout, pause }
    }

    /// Creates a selector from work unit configuration.
    #[must_use]
    pub fn from_config(config: &WorkDocConfig) -> Self {
        Self::new(config.lock_timeout, config.retry_pause)
    }

    /// Returns the wait bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `select` against `connection` until the row lock is resolved.
    ///
    /// # Errors
    ///
    /// Returns [`WorkDocError::Timeout`] naming `resource` if the row stays
    /// locked past the bound, or [`WorkDocError::Database`] for any other
    /// storage failure.
    pub fn select_row<C, F>(&self, connection: &mut C, resource: &str, mut select: F) -> WorkDocResult<bool>
    where
        C: ?Sized,
        F: FnMut(&mut C) -> Result<bool, StorageError>,
    {
        retry_until_deadline(
            self.timeout,
            self.pause,
            || select(connection),
            StorageError::is_row_locked,
        )
        .map_err(|e| match e {
            RetryError::TimedOut { waited, last } => {
                warn!(resource, ?waited, error = %last, "row lock not obtained");
                WorkDocError::Timeout {
                    resource: resource.to_string(),
                    waited,
                }
            }
            RetryError::Failed(source) => WorkDocError::database(resource, source),
        })
    }
}

impl Default for RowSelector {
    fn default() -> Self {
        Self::from_config(&WorkDocConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked() -> StorageError {
        StorageError::RowLocked {
            table: "t".into(),
            key: "k".into(),
        }
    }

    #[test]
    fn retry_returns_first_success() {
        let mut calls = 0;
        let result: Result<u32, RetryError<&str>> = retry_until_deadline(
            Duration::from_secs(1),
            Duration::from_millis(1),
            || {
                calls += 1;
                if calls < 3 {
                    Err("busy")
                } else {
                    Ok(calls)
                }
            },
            |_| true,
        );
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn retry_stops_on_permanent_error() {
        let mut calls = 0;
        let result: Result<(), RetryError<&str>> = retry_until_deadline(
            Duration::from_secs(1),
            Duration::from_millis(1),
            || {
                calls += 1;
                Err("fatal")
            },
            |e| *e == "busy",
        );
        assert!(matches!(result, Err(RetryError::Failed("fatal"))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_gives_up_near_the_deadline() {
        let timeout = Duration::from_millis(100);
        let start = Instant::now();
        let result: Result<(), RetryError<&str>> =
            retry_until_deadline(timeout, Duration::from_millis(10), || Err("busy"), |_| true);
        let elapsed = start.elapsed();

        match result {
            Err(RetryError::TimedOut { waited, last }) => {
                assert!(waited >= timeout);
                assert_eq!(last, "busy");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn zero_timeout_still_attempts_once() {
        let mut calls = 0;
        let result: Result<(), RetryError<&str>> =
            retry_until_deadline(Duration::ZERO, Duration::from_millis(1), || {
                calls += 1;
                Err("busy")
            }, |_| true);
        assert!(matches!(result, Err(RetryError::TimedOut { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn select_row_passes_through_found_and_missing() {
        let selector = RowSelector::new(Duration::from_millis(50), Duration::from_millis(1));
        let mut conn = ();
        assert!(selector.select_row(&mut conn, "orders", |_| Ok(true)).unwrap());
        assert!(!selector.select_row(&mut conn, "orders", |_| Ok(false)).unwrap());
    }

    #[test]
    fn select_row_retries_contention() {
        let selector = RowSelector::new(Duration::from_secs(1), Duration::from_millis(1));
        let mut remaining = 3;
        let found = selector
            .select_row(&mut (), "orders", |_| {
                if remaining > 0 {
                    remaining -= 1;
                    Err(locked())
                } else {
                    Ok(true)
                }
            })
            .unwrap();
        assert!(found);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn select_row_times_out_with_resource_label() {
        let selector = RowSelector::new(Duration::from_millis(60), Duration::from_millis(5));
        let err = selector
            .select_row(&mut (), "orders", |_| Err(locked()))
            .unwrap_err();
        match err {
            WorkDocError::Timeout { resource, waited } => {
                assert_eq!(resource, "orders");
                assert!(waited >= Duration::from_millis(60));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn select_row_wraps_other_failures() {
        let selector = RowSelector::default();
        let err = selector
            .select_row(&mut (), "orders", |_| {
                Err(StorageError::TableNotFound("order_docs".into()))
            })
            .unwrap_err();
        assert!(matches!(err, WorkDocError::Database { .. }));
    }
}
