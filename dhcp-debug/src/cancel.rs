//! Cancellation bridge between the caller and a running session.
//!
//! Two halves are involved:
//!
//! - [`CancelHandle`] / [`CancelToken`]: a cooperative signal into the
//!   session. The orchestrator races every phase against the token, so a
//!   fired token ends the session at its next suspension point. Cleanup
//!   still runs on the session's task.
//! - [`wait_or_abort`]: the caller's single wait. It races the session's
//!   [`Completion`] against an external abort future (an operator signal).
//!   If the abort wins, the caller detaches: the session keeps running in
//!   the background and releases its endpoint on its own.

use crate::completion::Completion;
use crate::outcome::{SessionOutcome, SessionReport};
use std::future::Future;
use tokio::sync::watch;
use tracing::debug;

/// Create a linked cancel handle and token.
pub fn token() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Fires the cancellation signal. Dropping the handle does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes the cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        token().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the handle has fired.
    ///
    /// If the handle is dropped without firing, this never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Result of the caller's wait.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The session published its report before the abort fired.
    Finished(SessionReport),
    /// The abort fired first; the caller no longer waits on the session.
    Detached,
}

impl WaitOutcome {
    /// Process exit code: 1 if the session failed, 0 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            WaitOutcome::Finished(SessionReport {
                outcome: SessionOutcome::Failed(_),
                ..
            }) => 1,
            _ => 0,
        }
    }
}

/// Wait for the session to finish, or stop waiting as soon as `abort` resolves.
pub async fn wait_or_abort<A>(completion: Completion, abort: A) -> WaitOutcome
where
    A: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = abort => {
            debug!("Abort received, detaching from session");
            WaitOutcome::Detached
        }
        report = completion.wait() => WaitOutcome::Finished(report),
    }
}
