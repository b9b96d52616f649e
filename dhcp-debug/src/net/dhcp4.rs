//! DHCPv4 protocol engine.

use super::{Dhcp4Lease, Dhcp4Offer, Endpoint, Interface};
use crate::error::NetworkError;
use async_trait::async_trait;
use dhcproto::v4::{DhcpOption, Flags, Message, MessageType, Opcode, OptionCode};
use dhcproto::{Decodable, Encodable};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Interval between retransmissions within one phase.
const RETRANSMIT_INTERVAL: Duration = Duration::from_secs(4);
/// Sends per phase before the engine gives up on its own.
const MAX_ATTEMPTS: u32 = 4;

/// Phase-level DHCPv4 operations.
///
/// Each call is one request/response round trip. Callers bound the call
/// with their own deadline; implementations must be cancel-safe (dropping
/// the future abandons the round trip).
#[async_trait]
pub trait Dhcp4Engine: Send {
    /// Broadcast DISCOVER and wait for an OFFER.
    async fn discover_offer(&mut self) -> Result<Dhcp4Offer, NetworkError>;

    /// Send REQUEST for `offer` and wait for ACK (or NAK).
    async fn request_from_offer(&mut self, offer: &Dhcp4Offer) -> Result<Dhcp4Lease, NetworkError>;

    /// Send RELEASE for `lease`. No response is expected.
    async fn release(&mut self, lease: &Dhcp4Lease) -> Result<(), NetworkError>;

    /// Release the underlying endpoint. Idempotent.
    fn close(&mut self) -> Result<(), NetworkError>;
}

/// Addressing options for [`Dhcp4Client`].
#[derive(Debug, Clone, Default)]
pub struct Dhcp4ClientOptions {
    /// Local unicast address to bind instead of `0.0.0.0:68`.
    pub client: Option<SocketAddrV4>,
    /// Server to send to instead of `255.255.255.255:67`.
    pub server: Option<SocketAddrV4>,
    /// Dump every sent and received message.
    pub debug: bool,
}

/// DHCPv4 client over a UDP endpoint bound to one interface.
pub struct Dhcp4Client {
    endpoint: Endpoint,
    mac: [u8; 6],
    xid: u32,
    server: SocketAddrV4,
    unicast: bool,
    debug: bool,
}

impl Dhcp4Client {
    pub fn new(iface: &Interface, opts: Dhcp4ClientOptions) -> Result<Self, NetworkError> {
        let unicast = opts.client.is_some();
        let local = opts
            .client
            .unwrap_or(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DHCP_CLIENT_PORT));
        let server = opts
            .server
            .unwrap_or(SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_SERVER_PORT));

        // A unicast source may still send to the broadcast default server.
        let broadcast = !unicast || server.ip().is_broadcast();
        let endpoint = Endpoint::bind_v4(iface, local, broadcast)?;

        Ok(Self {
            endpoint,
            mac: iface.mac,
            xid: generate_xid(),
            server,
            unicast,
            debug: opts.debug,
        })
    }

    fn new_message(&self, msg_type: MessageType) -> Message {
        let mut msg = Message::default();
        msg.set_opcode(Opcode::BootRequest);
        msg.set_xid(self.xid);
        if !self.unicast {
            msg.set_flags(Flags::default().set_broadcast());
        }
        msg.set_chaddr(&self.mac);
        msg.opts_mut().insert(DhcpOption::MessageType(msg_type));
        msg
    }

    fn discover_message(&self) -> Message {
        let mut msg = self.new_message(MessageType::Discover);
        msg.opts_mut().insert(DhcpOption::ParameterRequestList(vec![
            OptionCode::SubnetMask,
            OptionCode::Router,
            OptionCode::DomainNameServer,
            OptionCode::DomainName,
            OptionCode::AddressLeaseTime,
        ]));
        msg
    }

    fn request_message(&self, offer: &Dhcp4Offer) -> Message {
        let mut msg = self.new_message(MessageType::Request);
        msg.opts_mut()
            .insert(DhcpOption::RequestedIpAddress(offer.offered_ip));
        msg.opts_mut()
            .insert(DhcpOption::ServerIdentifier(offer.server_id));
        msg
    }

    fn release_message(&self, lease: &Dhcp4Lease) -> Message {
        let mut msg = self.new_message(MessageType::Release);
        msg.set_flags(Flags::default());
        msg.set_ciaddr(lease.address);
        msg.opts_mut()
            .insert(DhcpOption::ServerIdentifier(lease.server_id));
        msg
    }

    async fn send(&self, msg: &Message, dest: SocketAddrV4) -> Result<(), NetworkError> {
        let bytes = msg
            .to_vec()
            .map_err(|e| NetworkError::InvalidPacket(e.to_string()))?;
        if self.debug {
            info!(dest = %dest, message = ?msg, "DHCPv4 send");
        }
        self.endpoint.socket()?.send_to(&bytes, dest).await?;
        Ok(())
    }

    /// Send `msg` and wait for a matching response, retransmitting on silence.
    ///
    /// `accept` returns `None` for messages that should be skipped.
    async fn round_trip<T, F>(&self, msg: &Message, mut accept: F) -> Result<T, NetworkError>
    where
        F: FnMut(&Message) -> Option<Result<T, NetworkError>> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            self.send(msg, self.server).await?;

            match timeout(RETRANSMIT_INTERVAL, self.recv_matching(&mut accept)).await {
                Ok(res) => return res,
                Err(_) => debug!(attempt, "DHCPv4: No response, retransmitting"),
            }
        }

        Err(NetworkError::Timeout)
    }

    async fn recv_matching<T, F>(&self, accept: &mut F) -> Result<T, NetworkError>
    where
        F: FnMut(&Message) -> Option<Result<T, NetworkError>> + Send,
    {
        let socket = self.endpoint.socket()?;
        let mut buf = [0u8; 1500];

        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;

            let msg = match Message::from_bytes(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(from = %from, error = %e, "DHCPv4: Ignoring undecodable packet");
                    continue;
                }
            };

            if msg.opcode() != Opcode::BootReply || msg.xid() != self.xid {
                continue;
            }

            if self.debug {
                info!(from = %from, message = ?msg, "DHCPv4 recv");
            }

            if let Some(res) = accept(&msg) {
                return res;
            }
        }
    }
}

#[async_trait]
impl Dhcp4Engine for Dhcp4Client {
    async fn discover_offer(&mut self) -> Result<Dhcp4Offer, NetworkError> {
        info!(iface = %self.endpoint.interface().name, "DHCPv4: Sending DISCOVER");
        let discover = self.discover_message();

        let offer = self
            .round_trip(&discover, |msg| match message_type(msg) {
                Some(MessageType::Offer) => Some(parse_offer(msg)),
                _ => None,
            })
            .await?;

        info!(offered = %offer.offered_ip, server = %offer.server_id, "DHCPv4: Received OFFER");
        Ok(offer)
    }

    async fn request_from_offer(&mut self, offer: &Dhcp4Offer) -> Result<Dhcp4Lease, NetworkError> {
        info!(requested = %offer.offered_ip, "DHCPv4: Sending REQUEST");
        let request = self.request_message(offer);

        let lease = self
            .round_trip(&request, |msg| match message_type(msg) {
                Some(MessageType::Ack) => Some(Ok(parse_lease(msg, offer.server_id))),
                Some(MessageType::Nak) => Some(Err(NetworkError::DhcpNak)),
                _ => None,
            })
            .await?;

        info!(address = %lease.address, lease_time = lease.lease_time, "DHCPv4: Received ACK");
        Ok(lease)
    }

    async fn release(&mut self, lease: &Dhcp4Lease) -> Result<(), NetworkError> {
        let dest = SocketAddrV4::new(lease.server_id, DHCP_SERVER_PORT);
        info!(address = %lease.address, server = %dest, "DHCPv4: Sending RELEASE");
        let release = self.release_message(lease);
        self.send(&release, dest).await
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.endpoint.close()
    }
}

fn message_type(msg: &Message) -> Option<MessageType> {
    match msg.opts().get(OptionCode::MessageType) {
        Some(DhcpOption::MessageType(t)) => Some(*t),
        _ => None,
    }
}

fn parse_offer(msg: &Message) -> Result<Dhcp4Offer, NetworkError> {
    let server_id = match msg.opts().get(OptionCode::ServerIdentifier) {
        Some(DhcpOption::ServerIdentifier(id)) => *id,
        _ => return Err(NetworkError::MissingOption("server identifier")),
    };

    Ok(Dhcp4Offer {
        offered_ip: msg.yiaddr(),
        server_id,
        message: msg.clone(),
    })
}

/// Build a lease from an ACK. `fallback_server` is used when the ACK omits
/// the server identifier.
pub fn parse_lease(msg: &Message, fallback_server: Ipv4Addr) -> Dhcp4Lease {
    let address = msg.yiaddr();

    let netmask = match msg.opts().get(OptionCode::SubnetMask) {
        Some(DhcpOption::SubnetMask(mask)) => *mask,
        _ => Ipv4Addr::new(255, 255, 255, 0),
    };

    let gateway = match msg.opts().get(OptionCode::Router) {
        Some(DhcpOption::Router(routers)) if !routers.is_empty() => Some(routers[0]),
        _ => None,
    };

    let dns_servers = match msg.opts().get(OptionCode::DomainNameServer) {
        Some(DhcpOption::DomainNameServer(servers)) => servers.clone(),
        _ => vec![],
    };

    let lease_time = match msg.opts().get(OptionCode::AddressLeaseTime) {
        Some(DhcpOption::AddressLeaseTime(time)) => *time,
        _ => 86400, // Default 24 hours
    };

    let server_id = match msg.opts().get(OptionCode::ServerIdentifier) {
        Some(DhcpOption::ServerIdentifier(id)) => *id,
        _ => fallback_server,
    };

    Dhcp4Lease {
        address,
        netmask,
        gateway,
        dns_servers,
        lease_time,
        server_id,
    }
}

fn generate_xid() -> u32 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_nanos() as u32) ^ (std::process::id() << 16)
}
