//! Per-request deadline shared by every strategy of one scrape.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use tidyread_core::Error;

/// Absolute point in time after which a request stops doing work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self { at: Some(Instant::now() + budget) }
    }

    /// No deadline at all.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// The shorter of `timeout` and the time left.
    pub fn cap(&self, timeout: Duration) -> Duration {
        self.remaining().map_or(timeout, |left| left.min(timeout))
    }

    /// Run `fut` for at most `cap(timeout)`.
    ///
    /// The future is dropped on expiry; `what` names the step in the error.
    pub async fn run<T, F>(&self, timeout: Duration, what: &str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let limit = self.cap(timeout);
        if limit.is_zero() {
            return Err(Error::Timeout(format!("{what}: request deadline exceeded")));
        }
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{what} after {}ms", limit.as_millis())))?
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_deadline() {
        let d = Deadline::none();
        assert!(d.remaining().is_none());
        assert!(!d.is_expired());
        assert_eq!(d.cap(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cap_uses_shorter_duration() {
        let d = Deadline::after(Duration::from_millis(200));
        assert!(d.cap(Duration::from_secs(30)) <= Duration::from_millis(200));
        assert_eq!(d.cap(Duration::from_millis(10)), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_expired_deadline_rejects_without_polling() {
        let d = Deadline::after(Duration::ZERO);
        assert!(d.is_expired());
        let polled = std::sync::atomic::AtomicBool::new(false);
        let result: Result<(), Error> = d
            .run(Duration::from_secs(1), "fetch", async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let d = Deadline::none();
        let result: Result<(), Error> = d
            .run(Duration::from_millis(20), "navigation", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(msg)) if msg.contains("navigation")));
    }
}
