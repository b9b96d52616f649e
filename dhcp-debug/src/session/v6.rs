//! DHCPv6 exchange, either four-message or rapid commit.

use super::{Exchange, Phase, PhaseRunner};
use crate::config::Dhcp6Config;
use crate::error::{ConstructionError, NetworkError, SessionError};
use crate::net::dhcp6::Dhcp6ClientOptions;
use crate::net::{Dhcp6Client, Dhcp6Engine, Dhcp6Reply, Interface, MessageDump};
use crate::outcome::{ExchangeResult, OutcomeSlot};
use async_trait::async_trait;
use tracing::{debug, info};

/// Message sequence used to obtain a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageMode {
    /// SOLICIT, ADVERTISE, REQUEST, REPLY.
    #[default]
    FourMessage,
    /// SOLICIT with Rapid Commit, REPLY.
    Rapid,
}

impl MessageMode {
    /// `4` selects the four-message exchange, anything else rapid commit.
    pub fn from_count(count: u32) -> Self {
        if count == 4 {
            MessageMode::FourMessage
        } else {
            MessageMode::Rapid
        }
    }
}

pub struct Dhcp6Exchange<E = Dhcp6Client> {
    engine: E,
    mode: MessageMode,
}

impl Dhcp6Exchange<Dhcp6Client> {
    /// Bind a DHCPv6 client on `iface`.
    pub fn bind(
        iface: &Interface,
        config: &Dhcp6Config,
        debug: bool,
    ) -> Result<Self, ConstructionError> {
        let opts = Dhcp6ClientOptions {
            server: config.server,
            debug,
        };
        let engine = Dhcp6Client::new(iface, opts).map_err(ConstructionError::Bind)?;
        Ok(Self::new(engine, config.mode))
    }
}

impl<E: Dhcp6Engine> Dhcp6Exchange<E> {
    pub fn new(engine: E, mode: MessageMode) -> Self {
        Self { engine, mode }
    }
}

#[async_trait]
impl<E: Dhcp6Engine> Exchange for Dhcp6Exchange<E> {
    fn name(&self) -> &'static str {
        "dhcp6"
    }

    async fn exchange(
        &mut self,
        phases: &PhaseRunner,
        release: bool,
        _slot: &mut OutcomeSlot,
    ) -> Result<ExchangeResult, SessionError> {
        let engine = &mut self.engine;

        let reply = match self.mode {
            MessageMode::FourMessage => {
                let advertise = phases
                    .run(Phase::SolicitAdvertise, engine.solicit())
                    .await?;
                println!("{}", MessageDump(&advertise));

                phases
                    .run(Phase::RequestReply, engine.request(&advertise))
                    .await?
            }
            MessageMode::Rapid => {
                phases
                    .run(Phase::RapidSolicitReply, engine.rapid_solicit())
                    .await?
            }
        };

        let reply = Dhcp6Reply::new(reply);
        println!("{reply}");
        info!(address = ?reply.lease.address, "Reply received");

        if release {
            // No RELEASE is sent for DHCPv6.
            debug!("Release requested but not supported for DHCPv6");
        }

        Ok(ExchangeResult::V6(reply))
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.engine.close()
    }
}
