//! Phases of an exchange and the per-phase timeout policy.

use crate::cancel::CancelToken;
use crate::deadline::Deadline;
use crate::error::{NetworkError, SessionError};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, debug, info_span, warn};

/// One request/response round trip within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    DiscoverOffer,
    RequestAck,
    Release,
    SolicitAdvertise,
    RequestReply,
    RapidSolicitReply,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DiscoverOffer => "discover/offer",
            Phase::RequestAck => "request/ack",
            Phase::Release => "release",
            Phase::SolicitAdvertise => "solicit/advertise",
            Phase::RequestReply => "request/reply",
            Phase::RapidSolicitReply => "rapid solicit/reply",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed time budget per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseBudgets {
    pub discover: Duration,
    pub request: Duration,
    pub solicit: Duration,
    pub request6: Duration,
    pub release: Duration,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            discover: Duration::from_secs(15),
            request: Duration::from_secs(15),
            solicit: Duration::from_secs(15),
            request6: Duration::from_secs(15),
            release: Duration::from_secs(5),
        }
    }
}

impl PhaseBudgets {
    pub fn for_phase(&self, phase: Phase) -> Duration {
        match phase {
            Phase::DiscoverOffer => self.discover,
            Phase::RequestAck => self.request,
            Phase::Release => self.release,
            Phase::SolicitAdvertise | Phase::RapidSolicitReply => self.solicit,
            Phase::RequestReply => self.request6,
        }
    }
}

/// Runs phases of one session under its deadline and cancel token.
#[derive(Debug, Clone)]
pub struct PhaseRunner {
    deadline: Deadline,
    budgets: PhaseBudgets,
    cancel: CancelToken,
}

impl PhaseRunner {
    pub fn new(deadline: Deadline, budgets: PhaseBudgets, cancel: CancelToken) -> Self {
        Self {
            deadline,
            budgets,
            cancel,
        }
    }

    /// Drive one phase.
    ///
    /// The phase gets its own deadline derived from the session deadline
    /// now. An already expired session deadline fails the phase without
    /// polling `op`. Engine timeouts and deadline expiry both surface as
    /// [`SessionError::PhaseTimeout`]; a fired cancel token surfaces as
    /// [`SessionError::Cancelled`].
    pub async fn run<T, F>(&self, phase: Phase, op: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, NetworkError>>,
    {
        let deadline = self.deadline.child(self.budgets.for_phase(phase));

        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled { phase });
        }
        if deadline.is_expired() {
            warn!(%phase, "Session deadline passed before phase started");
            return Err(SessionError::PhaseTimeout { phase });
        }

        let span = info_span!("phase", %phase);
        async move {
            debug!(budget_ms = deadline.remaining().as_millis() as u64, "Phase started");

            let res = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(SessionError::Cancelled { phase }),
                res = deadline.run(op) => match res {
                    None | Some(Err(NetworkError::Timeout)) => {
                        Err(SessionError::PhaseTimeout { phase })
                    }
                    Some(Err(source)) => Err(SessionError::Protocol { phase, source }),
                    Some(Ok(value)) => Ok(value),
                },
            };

            match &res {
                Ok(_) => debug!("Phase completed"),
                Err(e) => warn!(error = %e, "Phase failed"),
            }
            res
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel;

    fn runner(session: Duration) -> PhaseRunner {
        PhaseRunner::new(
            Deadline::after(session),
            PhaseBudgets::default(),
            CancelToken::never(),
        )
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::DiscoverOffer.to_string(), "discover/offer");
        assert_eq!(Phase::RapidSolicitReply.to_string(), "rapid solicit/reply");
    }

    #[test]
    fn test_budgets_for_phase() {
        let budgets = PhaseBudgets::default();
        assert_eq!(
            budgets.for_phase(Phase::DiscoverOffer),
            Duration::from_secs(15)
        );
        assert_eq!(budgets.for_phase(Phase::Release), Duration::from_secs(5));
        assert_eq!(
            budgets.for_phase(Phase::RapidSolicitReply),
            budgets.solicit
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_ok() {
        let res = runner(Duration::from_secs(30))
            .run(Phase::DiscoverOffer, async { Ok::<_, NetworkError>(7) })
            .await;
        assert_eq!(res.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_budget_expires_before_session() {
        let start = tokio::time::Instant::now();
        let res = runner(Duration::from_secs(30))
            .run(Phase::DiscoverOffer, async {
                std::future::pending::<Result<(), NetworkError>>().await
            })
            .await;

        assert!(matches!(
            res,
            Err(SessionError::PhaseTimeout {
                phase: Phase::DiscoverOffer
            })
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_clamped_by_session_deadline() {
        let start = tokio::time::Instant::now();
        let res = runner(Duration::from_millis(1))
            .run(Phase::DiscoverOffer, async {
                std::future::pending::<Result<(), NetworkError>>().await
            })
            .await;

        assert!(matches!(res, Err(SessionError::PhaseTimeout { .. })));
        assert_eq!(start.elapsed(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_skips_op() {
        let runner = runner(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let mut polled = false;
        let res = runner
            .run(Phase::RequestAck, async {
                polled = true;
                Ok::<_, NetworkError>(())
            })
            .await;

        assert!(matches!(
            res,
            Err(SessionError::PhaseTimeout {
                phase: Phase::RequestAck
            })
        ));
        assert!(!polled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_errors_are_mapped() {
        let runner = runner(Duration::from_secs(30));

        let res = runner
            .run(Phase::RequestAck, async {
                Err::<(), _>(NetworkError::DhcpNak)
            })
            .await;
        assert!(matches!(
            res,
            Err(SessionError::Protocol {
                phase: Phase::RequestAck,
                source: NetworkError::DhcpNak
            })
        ));

        let res = runner
            .run(Phase::RequestAck, async {
                Err::<(), _>(NetworkError::Timeout)
            })
            .await;
        assert!(matches!(res, Err(SessionError::PhaseTimeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_phase() {
        let (handle, token) = cancel::token();
        let runner = PhaseRunner::new(
            Deadline::after(Duration::from_secs(30)),
            PhaseBudgets::default(),
            token,
        );

        let phase = tokio::spawn(async move {
            runner
                .run(Phase::SolicitAdvertise, async {
                    std::future::pending::<Result<(), NetworkError>>().await
                })
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let res = phase.await.unwrap();
        assert!(matches!(
            res,
            Err(SessionError::Cancelled {
                phase: Phase::SolicitAdvertise
            })
        ));
    }
}
