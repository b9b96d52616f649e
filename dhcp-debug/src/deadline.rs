//! Absolute deadlines for sessions and the phases nested inside them.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

/// Upper bound used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A point in time after which an operation must give up.
///
/// Deadlines are plain values. A phase derives its own deadline from the
/// session deadline with [`Deadline::child`] at the moment it starts, so
/// time spent in earlier phases is accounted for automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    expiry: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let expiry = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { expiry }
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    /// Derive a nested deadline: `min(now + budget, self.expiry)`.
    pub fn child(&self, budget: Duration) -> Deadline {
        Deadline::after(budget).min(*self)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expiry.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expiry
    }

    /// Drive `fut` until it completes or the deadline passes.
    ///
    /// Returns `None` if the deadline won. The future is dropped in that case.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        timeout_at(self.expiry, fut).await.ok()
    }
}
