//! Session outcomes and the first-error-wins slot that produces them.

use crate::error::SessionError;
use crate::net::{Dhcp4Lease, Dhcp6Reply};
use tracing::warn;

/// Artifact of a successful exchange.
#[derive(Debug, Clone)]
pub enum ExchangeResult {
    V4(Dhcp4Lease),
    V6(Dhcp6Reply),
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Succeeded(ExchangeResult),
    Failed(SessionError),
    Cancelled,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Succeeded(_))
    }
}

/// Final report published through the completion signal.
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    /// Errors that did not become the outcome: later failures that lost the
    /// first-error-wins race, and best-effort release failures.
    pub diagnostics: Vec<SessionError>,
}

impl From<SessionOutcome> for SessionReport {
    fn from(outcome: SessionOutcome) -> Self {
        Self {
            outcome,
            diagnostics: Vec::new(),
        }
    }
}

/// Accumulates the result of one session run.
///
/// Only the first recorded error is kept as the primary error. Everything
/// after it is demoted to a diagnostic.
#[derive(Debug, Default)]
pub struct OutcomeSlot {
    result: Option<ExchangeResult>,
    error: Option<SessionError>,
    diagnostics: Vec<SessionError>,
}

impl OutcomeSlot {
    pub fn succeed(&mut self, result: ExchangeResult) {
        self.result = Some(result);
    }

    /// Record an error; only the first one becomes the primary error.
    pub fn record(&mut self, err: SessionError) {
        if self.error.is_none() {
            self.error = Some(err);
        } else {
            warn!(error = %err, "Secondary session error");
            self.diagnostics.push(err);
        }
    }

    /// Record an error that must never become the primary error.
    pub fn diagnose(&mut self, err: SessionError) {
        warn!(error = %err, "Session diagnostic");
        self.diagnostics.push(err);
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn finish(self) -> SessionReport {
        let outcome = match (self.error, self.result) {
            (Some(SessionError::Cancelled { .. }), _) => SessionOutcome::Cancelled,
            (Some(err), _) => SessionOutcome::Failed(err),
            (None, Some(result)) => SessionOutcome::Succeeded(result),
            (None, None) => SessionOutcome::Failed(SessionError::Abandoned),
        };

        SessionReport {
            outcome,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::session::Phase;
    use std::net::Ipv4Addr;

    fn lease() -> ExchangeResult {
        ExchangeResult::V4(Dhcp4Lease {
            address: Ipv4Addr::new(10, 0, 0, 100),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: None,
            dns_servers: vec![],
            lease_time: 3600,
            server_id: Ipv4Addr::new(10, 0, 0, 1),
        })
    }

    #[test]
    fn test_first_error_wins() {
        let mut slot = OutcomeSlot::default();
        slot.record(SessionError::PhaseTimeout {
            phase: Phase::DiscoverOffer,
        });
        slot.record(SessionError::Cleanup(NetworkError::Closed));

        let report = slot.finish();
        assert!(matches!(
            report.outcome,
            SessionOutcome::Failed(SessionError::PhaseTimeout {
                phase: Phase::DiscoverOffer
            })
        ));
        assert_eq!(report.diagnostics.len(), 1);
        assert!(matches!(
            report.diagnostics[0],
            SessionError::Cleanup(NetworkError::Closed)
        ));
    }

    #[test]
    fn test_success_without_errors() {
        let mut slot = OutcomeSlot::default();
        slot.succeed(lease());
        let report = slot.finish();
        assert!(report.outcome.is_success());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_error_after_success_fails_session() {
        let mut slot = OutcomeSlot::default();
        slot.succeed(lease());
        slot.record(SessionError::Cleanup(NetworkError::Closed));
        let report = slot.finish();
        assert!(matches!(
            report.outcome,
            SessionOutcome::Failed(SessionError::Cleanup(_))
        ));
    }

    #[test]
    fn test_diagnostic_keeps_success() {
        let mut slot = OutcomeSlot::default();
        slot.succeed(lease());
        slot.diagnose(SessionError::Release(NetworkError::Timeout));
        assert!(!slot.has_error());

        let report = slot.finish();
        assert!(report.outcome.is_success());
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_cancellation_maps_to_cancelled() {
        let mut slot = OutcomeSlot::default();
        slot.record(SessionError::Cancelled {
            phase: Phase::RequestAck,
        });
        slot.record(SessionError::Cleanup(NetworkError::Closed));
        let report = slot.finish();
        assert!(matches!(report.outcome, SessionOutcome::Cancelled));
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_empty_slot_is_abandoned() {
        let report = OutcomeSlot::default().finish();
        assert!(matches!(
            report.outcome,
            SessionOutcome::Failed(SessionError::Abandoned)
        ));
    }
}
