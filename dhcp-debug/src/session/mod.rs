//! Session orchestrator.
//!
//! A [`Session`] drives one lease exchange from start to finish:
//!
//! 1. derive the session deadline from the configured timeout,
//! 2. let the variant-specific [`Exchange`] run its phases through a
//!    [`PhaseRunner`], each phase under its own nested deadline,
//! 3. close the endpoint, whatever happened before,
//! 4. publish exactly one [`SessionReport`](crate::outcome::SessionReport)
//!    through the completion signal.
//!
//! The IPv4 and IPv6 variants only differ in their [`Exchange`]
//! implementation; the lifecycle above is shared.

mod phase;
pub mod v4;
pub mod v6;

pub use phase::{Phase, PhaseBudgets, PhaseRunner};
pub use v4::Dhcp4Exchange;
pub use v6::{Dhcp6Exchange, MessageMode};

use crate::cancel::CancelToken;
use crate::completion::{self, Completion, CompletionSender};
use crate::config::{ProtocolConfig, SessionConfig};
use crate::deadline::Deadline;
use crate::error::{ConstructionError, NetworkError, SessionError};
use crate::net::{Dhcp4Client, Dhcp6Client};
use crate::outcome::{ExchangeResult, OutcomeSlot};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span};

/// Variant-specific phase sequencing.
#[async_trait]
pub trait Exchange: Send {
    /// Short label for logs ("dhcp4", "dhcp6").
    fn name(&self) -> &'static str;

    /// Run all phases in order. Failures end the exchange; best-effort
    /// steps report their errors through `slot.diagnose`.
    async fn exchange(
        &mut self,
        phases: &PhaseRunner,
        release: bool,
        slot: &mut OutcomeSlot,
    ) -> Result<ExchangeResult, SessionError>;

    /// Release the endpoint. Must be idempotent.
    fn close(&mut self) -> Result<(), NetworkError>;
}

/// Common lifecycle for both protocol variants.
pub trait Orchestrator: Send {
    /// Start the session on a background task and return its completion.
    fn start(self: Box<Self>, cancel: CancelToken, release: bool) -> Completion;
}

/// One lease exchange bound to one endpoint.
pub struct Session<X> {
    exchange: X,
    timeout: Duration,
    budgets: PhaseBudgets,
}

impl<X: Exchange> Session<X> {
    pub fn new(exchange: X, timeout: Duration) -> Self {
        Self {
            exchange,
            timeout,
            budgets: PhaseBudgets::default(),
        }
    }

    pub fn with_budgets(mut self, budgets: PhaseBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Run the session to completion and publish its report through `done`.
    pub async fn run(mut self, cancel: CancelToken, release: bool, done: CompletionSender) {
        let span = info_span!("session", proto = self.exchange.name());

        async move {
            let phases = PhaseRunner::new(Deadline::after(self.timeout), self.budgets, cancel);
            let mut slot = OutcomeSlot::default();

            info!(timeout_ms = self.timeout.as_millis() as u64, "Session started");

            match self.exchange.exchange(&phases, release, &mut slot).await {
                Ok(result) => slot.succeed(result),
                Err(e) => slot.record(e),
            }

            // Runs on every path; the endpoint is closed before anyone is notified.
            if let Err(e) = self.exchange.close() {
                error!(error = %e, "Failed to close endpoint");
                slot.record(SessionError::Cleanup(e));
            }

            let report = slot.finish();
            info!(success = report.outcome.is_success(), "Session finished");
            done.publish(report);
        }
        .instrument(span)
        .await
    }
}

impl<X: Exchange + 'static> Orchestrator for Session<X> {
    fn start(self: Box<Self>, cancel: CancelToken, release: bool) -> Completion {
        let (done, completion) = completion::channel();
        tokio::spawn((*self).run(cancel, release, done));
        completion
    }
}

/// Build the session described by `config`, binding its endpoint.
///
/// Nothing is sent before this returns. Must be called from within a
/// tokio runtime.
pub fn construct(config: &SessionConfig) -> Result<Box<dyn Orchestrator>, ConstructionError> {
    let iface = config.resolve_interface()?;

    let session: Box<dyn Orchestrator> = match &config.protocol {
        ProtocolConfig::V4(v4) => {
            let exchange = Dhcp4Exchange::<Dhcp4Client>::bind(&iface, v4, config.debug)?;
            Box::new(Session::new(exchange, config.timeout))
        }
        ProtocolConfig::V6(v6) => {
            let exchange = Dhcp6Exchange::<Dhcp6Client>::bind(&iface, v6, config.debug)?;
            Box::new(Session::new(exchange, config.timeout))
        }
    };

    Ok(session)
}
