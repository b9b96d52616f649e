//! DHCPv6 protocol engine.

use super::{DelegatedPrefix, Dhcp6Lease, Endpoint, Interface, MessageDump};
use crate::error::NetworkError;
use async_trait::async_trait;
use dhcproto::v6::{self, DhcpOption, DhcpOptions, Message, MessageType, OptionCode};
use dhcproto::{Decodable, Encodable};
use std::net::{Ipv6Addr, SocketAddrV6};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

pub const DHCP6_CLIENT_PORT: u16 = 546;
pub const DHCP6_SERVER_PORT: u16 = 547;
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

/// Interval between retransmissions within one phase.
const RETRANSMIT_INTERVAL: Duration = Duration::from_secs(4);
/// Sends per phase before the engine gives up on its own.
const MAX_ATTEMPTS: u32 = 4;

/// Phase-level DHCPv6 operations. Same cancellation rules as
/// [`Dhcp4Engine`](super::Dhcp4Engine).
#[async_trait]
pub trait Dhcp6Engine: Send {
    /// Send SOLICIT and wait for ADVERTISE.
    async fn solicit(&mut self) -> Result<Message, NetworkError>;

    /// Send REQUEST built from `advertise` and wait for REPLY.
    async fn request(&mut self, advertise: &Message) -> Result<Message, NetworkError>;

    /// Send SOLICIT with Rapid Commit and wait for REPLY.
    async fn rapid_solicit(&mut self) -> Result<Message, NetworkError>;

    /// Release the underlying endpoint. Idempotent.
    fn close(&mut self) -> Result<(), NetworkError>;
}

/// Addressing options for [`Dhcp6Client`].
#[derive(Debug, Clone, Default)]
pub struct Dhcp6ClientOptions {
    /// Destination instead of `[ff02::1:2]:547`.
    pub server: Option<SocketAddrV6>,
    /// Dump every sent and received message.
    pub debug: bool,
}

/// DHCPv6 client over a UDP endpoint bound to one interface.
pub struct Dhcp6Client {
    endpoint: Endpoint,
    mac: [u8; 6],
    duid: Vec<u8>,
    server: SocketAddrV6,
    debug: bool,
}

impl Dhcp6Client {
    pub fn new(iface: &Interface, opts: Dhcp6ClientOptions) -> Result<Self, NetworkError> {
        let local = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, DHCP6_CLIENT_PORT, 0, iface.index);
        let endpoint = Endpoint::bind_v6(iface, local)?;

        let mut server = opts.server.unwrap_or(SocketAddrV6::new(
            ALL_DHCP_RELAY_AGENTS_AND_SERVERS,
            DHCP6_SERVER_PORT,
            0,
            0,
        ));
        // Link-scoped destinations need the interface as scope.
        if server.scope_id() == 0 && needs_scope(server.ip()) {
            server.set_scope_id(iface.index);
        }

        Ok(Self {
            endpoint,
            mac: iface.mac,
            duid: generate_duid_ll(&iface.mac),
            server,
            debug: opts.debug,
        })
    }

    fn new_message(&self, msg_type: MessageType, xid: [u8; 3]) -> Message {
        let mut msg = Message::new(msg_type);
        msg.set_xid(xid);

        msg.opts_mut()
            .insert(DhcpOption::ClientId(self.duid.clone()));
        msg.opts_mut().insert(DhcpOption::ORO(v6::ORO {
            opts: vec![OptionCode::DomainNameServers, OptionCode::DomainSearchList],
        }));
        msg.opts_mut().insert(DhcpOption::ElapsedTime(0));
        msg
    }

    fn solicit_message(&self, xid: [u8; 3], rapid: bool) -> Message {
        let mut msg = self.new_message(MessageType::Solicit, xid);
        msg.opts_mut().insert(DhcpOption::IANA(v6::IANA {
            id: generate_iaid(&self.mac),
            t1: 0,
            t2: 0,
            opts: DhcpOptions::new(),
        }));
        if rapid {
            msg.opts_mut().insert(DhcpOption::RapidCommit);
        }
        msg
    }

    fn request_message(&self, xid: [u8; 3], advertise: &Message) -> Result<Message, NetworkError> {
        let server_duid = match advertise.opts().get(OptionCode::ServerId) {
            Some(DhcpOption::ServerId(duid)) => duid.clone(),
            _ => return Err(NetworkError::MissingOption("server identifier")),
        };

        let mut msg = self.new_message(MessageType::Request, xid);
        msg.opts_mut().insert(DhcpOption::ServerId(server_duid));

        // Ask for exactly what was advertised.
        let ia_na = match advertise.opts().get(OptionCode::IANA) {
            Some(DhcpOption::IANA(ia_na)) => ia_na.clone(),
            _ => v6::IANA {
                id: generate_iaid(&self.mac),
                t1: 0,
                t2: 0,
                opts: DhcpOptions::new(),
            },
        };
        msg.opts_mut().insert(DhcpOption::IANA(ia_na));

        Ok(msg)
    }

    async fn send(&self, msg: &Message) -> Result<(), NetworkError> {
        let bytes = msg
            .to_vec()
            .map_err(|e| NetworkError::InvalidPacket(e.to_string()))?;
        if self.debug {
            info!(dest = %self.server, "DHCPv6 send\n{}", MessageDump(msg));
        }
        self.endpoint.socket()?.send_to(&bytes, self.server).await?;
        Ok(())
    }

    /// Send `msg` and wait for a response of type `expect`, retransmitting on silence.
    async fn round_trip(&self, msg: &Message, expect: MessageType) -> Result<Message, NetworkError> {
        let rapid = msg.opts().get(OptionCode::RapidCommit).is_some();

        for attempt in 1..=MAX_ATTEMPTS {
            self.send(msg).await?;

            match timeout(RETRANSMIT_INTERVAL, self.recv_matching(msg.xid(), &expect, rapid)).await {
                Ok(res) => return res,
                Err(_) => debug!(attempt, "DHCPv6: No response, retransmitting"),
            }
        }

        Err(NetworkError::Timeout)
    }

    async fn recv_matching(
        &self,
        xid: [u8; 3],
        expect: &MessageType,
        rapid: bool,
    ) -> Result<Message, NetworkError> {
        let socket = self.endpoint.socket()?;
        let mut buf = [0u8; 1500];

        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;

            let msg = match Message::from_bytes(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(from = %from, error = %e, "DHCPv6: Ignoring undecodable packet");
                    continue;
                }
            };

            if msg.xid() != xid {
                continue;
            }

            if self.debug {
                info!(from = %from, "DHCPv6 recv\n{}", MessageDump(&msg));
            }

            if accepts(&msg, expect, rapid) {
                return Ok(msg);
            }
        }
    }
}

#[async_trait]
impl Dhcp6Engine for Dhcp6Client {
    async fn solicit(&mut self) -> Result<Message, NetworkError> {
        info!(iface = %self.endpoint.interface().name, "DHCPv6: Sending SOLICIT");
        let solicit = self.solicit_message(generate_xid(), false);
        let advertise = self.round_trip(&solicit, MessageType::Advertise).await?;
        info!("DHCPv6: Received ADVERTISE");
        Ok(advertise)
    }

    async fn request(&mut self, advertise: &Message) -> Result<Message, NetworkError> {
        info!("DHCPv6: Sending REQUEST");
        let request = self.request_message(generate_xid(), advertise)?;
        let reply = self.round_trip(&request, MessageType::Reply).await?;
        info!("DHCPv6: Received REPLY");
        Ok(reply)
    }

    async fn rapid_solicit(&mut self) -> Result<Message, NetworkError> {
        info!(
            iface = %self.endpoint.interface().name,
            "DHCPv6: Sending SOLICIT with rapid commit"
        );
        let solicit = self.solicit_message(generate_xid(), true);
        let reply = self.round_trip(&solicit, MessageType::Reply).await?;
        info!("DHCPv6: Received REPLY");
        Ok(reply)
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.endpoint.close()
    }
}

/// Whether `msg` answers a request expecting `expect`. A REPLY to a rapid
/// commit SOLICIT must carry Rapid Commit itself (RFC 8415 18.2.1).
fn accepts(msg: &Message, expect: &MessageType, rapid: bool) -> bool {
    if msg.msg_type() != *expect {
        return false;
    }
    if rapid && msg.opts().get(OptionCode::RapidCommit).is_none() {
        debug!("DHCPv6: Ignoring REPLY without rapid commit");
        return false;
    }
    true
}

/// Summarize a REPLY (or ADVERTISE) message.
pub fn parse_reply(msg: &Message) -> Dhcp6Lease {
    let server_duid = match msg.opts().get(OptionCode::ServerId) {
        Some(DhcpOption::ServerId(duid)) => Some(duid.clone()),
        _ => None,
    };

    let mut address = None;
    let mut prefix = None;
    let mut dns_servers = Vec::new();

    // Parse IA_NA for address
    if let Some(DhcpOption::IANA(ia_na)) = msg.opts().get(OptionCode::IANA) {
        for opt in ia_na.opts.iter() {
            if let DhcpOption::IAAddr(ia_addr) = opt {
                address = Some(ia_addr.addr);
                break;
            }
        }
    }

    // Parse IA_PD for prefix
    if let Some(DhcpOption::IAPD(ia_pd)) = msg.opts().get(OptionCode::IAPD) {
        for opt in ia_pd.opts.iter() {
            if let DhcpOption::IAPrefix(ia_prefix) = opt {
                prefix = Some(DelegatedPrefix {
                    prefix: ia_prefix.prefix_ip,
                    prefix_len: ia_prefix.prefix_len,
                    preferred_lifetime: ia_prefix.preferred_lifetime,
                    valid_lifetime: ia_prefix.valid_lifetime,
                });
                break;
            }
        }
    }

    if let Some(DhcpOption::DomainNameServers(servers)) =
        msg.opts().get(OptionCode::DomainNameServers)
    {
        dns_servers = servers.clone();
    }

    Dhcp6Lease {
        server_duid,
        address,
        prefix,
        dns_servers,
    }
}

fn needs_scope(addr: &Ipv6Addr) -> bool {
    addr.is_multicast() || (addr.segments()[0] & 0xffc0) == 0xfe80
}

fn generate_duid_ll(mac: &[u8; 6]) -> Vec<u8> {
    // DUID-LL (Link-Layer): type (2 bytes) + hw type (2 bytes) + link-layer address
    let mut duid = vec![
        0x00, 0x03, // DUID type: DUID-LL
        0x00, 0x01, // Hardware type: Ethernet
    ];
    duid.extend_from_slice(mac);
    duid
}

fn generate_xid() -> [u8; 3] {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let val = (now.as_nanos() as u32) ^ (std::process::id() << 8);
    [(val >> 16) as u8, (val >> 8) as u8, val as u8]
}

fn generate_iaid(mac: &[u8; 6]) -> u32 {
    // Use last 4 bytes of MAC as IAID
    u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

    fn reply_with_address(addr: Ipv6Addr) -> Message {
        let mut msg = Message::new(MessageType::Reply);
        msg.opts_mut().insert(DhcpOption::ServerId(vec![0, 3, 0, 1, 1, 2, 3, 4, 5, 6]));
        let ia_opts: DhcpOptions = std::iter::once(DhcpOption::IAAddr(v6::IAAddr {
            addr,
            preferred_life: 3600,
            valid_life: 7200,
            opts: DhcpOptions::new(),
        }))
        .collect();
        msg.opts_mut().insert(DhcpOption::IANA(v6::IANA {
            id: generate_iaid(&MAC),
            t1: 0,
            t2: 0,
            opts: ia_opts,
        }));
        msg
    }

    #[test]
    fn test_duid_ll() {
        let duid = generate_duid_ll(&MAC);
        assert_eq!(duid, vec![0, 3, 0, 1, 0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_iaid_uses_mac_tail() {
        assert_eq!(generate_iaid(&MAC), 0x0012_3456);
    }

    #[test]
    fn test_parse_reply_address_and_dns() {
        let addr: Ipv6Addr = "2001:db8::100".parse().unwrap();
        let dns: Ipv6Addr = "2001:db8::53".parse().unwrap();
        let mut msg = reply_with_address(addr);
        msg.opts_mut()
            .insert(DhcpOption::DomainNameServers(vec![dns]));

        let lease = parse_reply(&msg);
        assert_eq!(lease.address, Some(addr));
        assert_eq!(lease.dns_servers, vec![dns]);
        assert!(lease.prefix.is_none());
        assert_eq!(lease.server_duid.as_deref().map(|d| d.len()), Some(10));
    }

    #[test]
    fn test_parse_reply_without_ia() {
        let lease = parse_reply(&Message::new(MessageType::Reply));
        assert!(lease.address.is_none());
        assert!(lease.server_duid.is_none());
        assert!(lease.dns_servers.is_empty());
    }

    #[test]
    fn test_rapid_reply_needs_rapid_commit() {
        let plain = Message::new(MessageType::Reply);
        assert!(!accepts(&plain, &MessageType::Reply, true));
        assert!(accepts(&plain, &MessageType::Reply, false));

        let mut committed = Message::new(MessageType::Reply);
        committed.opts_mut().insert(DhcpOption::RapidCommit);
        assert!(accepts(&committed, &MessageType::Reply, true));

        let advertise = Message::new(MessageType::Advertise);
        assert!(!accepts(&advertise, &MessageType::Reply, true));
    }

    #[test]
    fn test_needs_scope() {
        assert!(needs_scope(&ALL_DHCP_RELAY_AGENTS_AND_SERVERS));
        assert!(needs_scope(&"fe80::1".parse().unwrap()));
        assert!(!needs_scope(&"2001:db8::1".parse().unwrap()));
    }
}
