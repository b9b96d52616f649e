//! Scripted protocol engines for session tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dhcp_debug::NetworkError;
use dhcp_debug::net::{Dhcp4Engine, Dhcp4Lease, Dhcp4Offer, Dhcp6Engine};
use dhcproto::{v4, v6};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const OFFERED_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 100, 20);
pub const SERVER_ID: Ipv4Addr = Ipv4Addr::new(192, 168, 100, 1);

/// What a scripted round trip does when called.
#[derive(Clone, Copy)]
pub enum Step {
    Reply,
    /// Reply after the given (virtual) delay.
    Delay(Duration),
    Fail(fn() -> NetworkError),
    /// Never answer.
    Hang,
}

impl Step {
    async fn perform(self) -> Result<(), NetworkError> {
        match self {
            Step::Reply => Ok(()),
            Step::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            Step::Fail(err) => Err(err()),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Shared view of what an engine did, readable after the session owns it.
#[derive(Clone, Default)]
pub struct Probe {
    calls: Arc<Mutex<Vec<&'static str>>>,
    closes: Arc<AtomicUsize>,
}

impl Probe {
    fn push(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn close(&self, fail: bool) -> Result<(), NetworkError> {
        self.push("close");
        // Only the first close does anything.
        if self.closes.fetch_add(1, Ordering::SeqCst) == 0 && fail {
            return Err(NetworkError::Close(nix::errno::Errno::EIO));
        }
        Ok(())
    }
}

pub struct MockDhcp4 {
    pub discover: Step,
    pub request: Step,
    pub release: Step,
    pub close_fails: bool,
    pub probe: Probe,
}

impl MockDhcp4 {
    pub fn new() -> Self {
        Self {
            discover: Step::Reply,
            request: Step::Reply,
            release: Step::Reply,
            close_fails: false,
            probe: Probe::default(),
        }
    }
}

#[async_trait]
impl Dhcp4Engine for MockDhcp4 {
    async fn discover_offer(&mut self) -> Result<Dhcp4Offer, NetworkError> {
        self.probe.push("discover");
        self.discover.perform().await?;
        Ok(Dhcp4Offer {
            offered_ip: OFFERED_IP,
            server_id: SERVER_ID,
            message: v4::Message::default(),
        })
    }

    async fn request_from_offer(&mut self, offer: &Dhcp4Offer) -> Result<Dhcp4Lease, NetworkError> {
        self.probe.push("request");
        self.request.perform().await?;
        Ok(Dhcp4Lease {
            address: offer.offered_ip,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Some(SERVER_ID),
            dns_servers: vec![SERVER_ID],
            lease_time: 3600,
            server_id: offer.server_id,
        })
    }

    async fn release(&mut self, _lease: &Dhcp4Lease) -> Result<(), NetworkError> {
        self.probe.push("release");
        self.release.perform().await
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.probe.close(self.close_fails)
    }
}

pub struct MockDhcp6 {
    pub solicit: Step,
    pub request: Step,
    pub rapid: Step,
    pub probe: Probe,
}

impl MockDhcp6 {
    pub fn new() -> Self {
        Self {
            solicit: Step::Reply,
            request: Step::Reply,
            rapid: Step::Reply,
            probe: Probe::default(),
        }
    }
}

#[async_trait]
impl Dhcp6Engine for MockDhcp6 {
    async fn solicit(&mut self) -> Result<v6::Message, NetworkError> {
        self.probe.push("solicit");
        self.solicit.perform().await?;
        Ok(v6::Message::new(v6::MessageType::Advertise))
    }

    async fn request(&mut self, _advertise: &v6::Message) -> Result<v6::Message, NetworkError> {
        self.probe.push("request");
        self.request.perform().await?;
        Ok(v6::Message::new(v6::MessageType::Reply))
    }

    async fn rapid_solicit(&mut self) -> Result<v6::Message, NetworkError> {
        self.probe.push("rapid");
        self.rapid.perform().await?;
        Ok(v6::Message::new(v6::MessageType::Reply))
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.probe.close(false)
    }
}
