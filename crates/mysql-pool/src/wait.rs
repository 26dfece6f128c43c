//! Bounded wait for a pool notification.

use std::time::Duration;

use tokio::sync::Notify;

/// What ended a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The notification fired.
    Notified,
    /// The timeout fired first.
    TimedOut,
}

/// Wait until `notify` fires or `timeout` elapses, whichever happens
/// first, and report which one it was.
///
/// The pool treats both outcomes the same way (re-scan and, if still
/// empty-handed, wait again): the timeout is a liveness backstop against
/// coalesced notifications, not an error. A permit stored by a
/// `notify_one` with no waiter registered completes the next call
/// immediately, so a release is never lost outright.
pub async fn wait_with_timeout(notify: &Notify, timeout: Duration) -> WaitOutcome {
    match tokio::time::timeout(timeout, notify.notified()).await {
        Ok(()) => WaitOutcome::Notified,
        Err(_) => WaitOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_notification_wins() {
        let notify = Arc::new(Notify::new());
        let waiter = {
            let notify = Arc::clone(&notify);
            tokio::spawn(async move {
                wait_with_timeout(&notify, Duration::from_secs(10)).await
            })
        };
        tokio::task::yield_now().await;
        notify.notify_one();
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Notified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wins() {
        let notify = Notify::new();
        let started = tokio::time::Instant::now();
        let outcome = wait_with_timeout(&notify, Duration::from_secs(10)).await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_permit_completes_immediately() {
        let notify = Notify::new();
        notify.notify_one();
        let started = tokio::time::Instant::now();
        let outcome = wait_with_timeout(&notify, Duration::from_secs(10)).await;
        assert_eq!(outcome, WaitOutcome::Notified);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
