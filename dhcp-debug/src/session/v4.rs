//! DHCPv4 exchange: DISCOVER/OFFER, REQUEST/ACK and an optional RELEASE.

use super::{Exchange, Phase, PhaseRunner};
use crate::config::Dhcp4Config;
use crate::error::{ConstructionError, NetworkError, SessionError};
use crate::net::dhcp4::Dhcp4ClientOptions;
use crate::net::{Dhcp4Client, Dhcp4Engine, Interface};
use crate::outcome::{ExchangeResult, OutcomeSlot};
use async_trait::async_trait;
use tracing::{debug, info};

pub struct Dhcp4Exchange<E = Dhcp4Client> {
    engine: E,
}

impl Dhcp4Exchange<Dhcp4Client> {
    /// Bind a DHCPv4 client on `iface`.
    pub fn bind(
        iface: &Interface,
        config: &Dhcp4Config,
        debug: bool,
    ) -> Result<Self, ConstructionError> {
        let opts = Dhcp4ClientOptions {
            client: config.client,
            server: config.server,
            debug,
        };
        let engine = Dhcp4Client::new(iface, opts).map_err(ConstructionError::Bind)?;
        Ok(Self::new(engine))
    }
}

impl<E: Dhcp4Engine> Dhcp4Exchange<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<E: Dhcp4Engine> Exchange for Dhcp4Exchange<E> {
    fn name(&self) -> &'static str {
        "dhcp4"
    }

    async fn exchange(
        &mut self,
        phases: &PhaseRunner,
        release: bool,
        slot: &mut OutcomeSlot,
    ) -> Result<ExchangeResult, SessionError> {
        let engine = &mut self.engine;

        let offer = phases
            .run(Phase::DiscoverOffer, engine.discover_offer())
            .await?;
        println!("{offer}");

        let lease = phases
            .run(Phase::RequestAck, engine.request_from_offer(&offer))
            .await?;
        println!("{lease}");
        info!(address = %lease.address, server = %lease.server_id, "Lease acquired");

        if release {
            match phases.run(Phase::Release, engine.release(&lease)).await {
                Ok(()) => info!(address = %lease.address, "Lease released"),
                // Best effort: the lease was already acquired.
                Err(e) => slot.diagnose(release_failure(e)),
            }
        } else {
            debug!("Release not requested");
        }

        Ok(ExchangeResult::V4(lease))
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.engine.close()
    }
}

fn release_failure(err: SessionError) -> SessionError {
    match err {
        SessionError::PhaseTimeout { .. } => SessionError::Release(NetworkError::Timeout),
        SessionError::Protocol { source, .. } => SessionError::Release(source),
        other => other,
    }
}
