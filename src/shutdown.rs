//! Cancellable waits for the blocking provisioning loops.
//!
//! The session and uploader run on plain threads (NimBLE callbacks and the
//! Wi-Fi driver are blocking APIs), so they wait in short slices and check a
//! [`CancellationToken`] between them.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Longest uninterrupted sleep inside [`sleep_or_cancel`].
const SLICE: Duration = Duration::from_millis(50);

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` if cancelled. A zero duration only checks the token.
pub fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

/// Why [`poll_until`] stopped without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitAborted {
    TimedOut,
    Cancelled,
}

/// Call `check` every `interval` until it yields a value.
///
/// Gives up once `timeout` has elapsed or `cancel` fires. The last sleep is
/// shortened so the wait never runs past the deadline by more than one check.
pub fn poll_until<T>(
    cancel: &CancellationToken,
    timeout: Duration,
    interval: Duration,
    mut check: impl FnMut() -> Option<T>,
) -> Result<T, WaitAborted> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(WaitAborted::TimedOut);
        }
        if sleep_or_cancel(cancel, interval.min(deadline - now)) {
            return Err(WaitAborted::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_returns_immediately() {
        let cancel = CancellationToken::new();
        assert!(!sleep_or_cancel(&cancel, Duration::ZERO));
    }

    #[test]
    fn test_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = Instant::now();
        assert!(sleep_or_cancel(&cancel, Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let started = Instant::now();
        assert!(sleep_or_cancel(&cancel, Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_full_sleep_without_cancel() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        assert!(!sleep_or_cancel(&cancel, Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    // ==================== Bounded Polling ====================

    #[test]
    fn test_poll_until_returns_first_value() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let result = poll_until(&cancel, Duration::from_secs(10), Duration::ZERO, || {
            calls += 1;
            (calls == 3).then_some(calls)
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_poll_until_respects_timeout() {
        let cancel = CancellationToken::new();
        let timeout = Duration::from_millis(120);
        let started = Instant::now();
        let result = poll_until(&cancel, timeout, Duration::from_millis(100), || None::<()>);

        assert_eq!(result, Err(WaitAborted::TimedOut));
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(1), "overran: {:?}", elapsed);
    }

    #[test]
    fn test_poll_until_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let interval = Duration::from_millis(10);
        let result = poll_until(&cancel, Duration::from_secs(10), interval, || None::<()>);
        assert_eq!(result, Err(WaitAborted::Cancelled));
    }
}
