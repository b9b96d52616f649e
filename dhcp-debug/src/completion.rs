//! One-shot completion signal from a session to its caller.

use crate::error::SessionError;
use crate::outcome::{SessionOutcome, SessionReport};
use tokio::sync::oneshot;
use tracing::debug;

/// Create the writer and reader halves of a completion signal.
pub fn channel() -> (CompletionSender, Completion) {
    let (tx, rx) = oneshot::channel();
    (CompletionSender { tx }, Completion { rx })
}

/// Writer half, owned by the session. Publishing consumes it.
#[derive(Debug)]
pub struct CompletionSender {
    tx: oneshot::Sender<SessionReport>,
}

impl CompletionSender {
    pub fn publish(self, report: SessionReport) {
        if self.tx.send(report).is_err() {
            debug!("Caller stopped waiting, session report discarded");
        }
    }
}

/// Reader half, owned by the caller. Waiting consumes it.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<SessionReport>,
}

impl Completion {
    /// Suspend until the session publishes its report.
    ///
    /// A session task that goes away without publishing (panic, abort)
    /// is reported as [`SessionError::Abandoned`].
    pub async fn wait(self) -> SessionReport {
        self.rx.await.unwrap_or_else(|_| {
            SessionReport::from(SessionOutcome::Failed(SessionError::Abandoned))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_wait() {
        let (tx, completion) = channel();
        tx.publish(SessionReport::from(SessionOutcome::Cancelled));
        let report = completion.wait().await;
        assert!(matches!(report.outcome, SessionOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_wait_blocks_until_published() {
        let (tx, completion) = channel();
        let waiter = tokio::spawn(completion.wait());
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        tx.publish(SessionReport::from(SessionOutcome::Cancelled));
        let report = waiter.await.unwrap();
        assert!(matches!(report.outcome, SessionOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_abandoned() {
        let (tx, completion) = channel();
        drop(tx);
        let report = completion.wait().await;
        assert!(matches!(
            report.outcome,
            SessionOutcome::Failed(SessionError::Abandoned)
        ));
    }

    #[tokio::test]
    async fn test_publish_without_reader_is_silent() {
        let (tx, completion) = channel();
        drop(completion);
        tx.publish(SessionReport::from(SessionOutcome::Cancelled));
    }
}
