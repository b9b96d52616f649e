//! Network side of a session: interface lookup, the bound endpoint, and the
//! DHCPv4/DHCPv6 protocol engines.

pub mod dhcp4;
pub mod dhcp6;
pub mod endpoint;
pub mod interface;

use dhcproto::v4;
use dhcproto::v6;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

pub use dhcp4::{Dhcp4Client, Dhcp4Engine};
pub use dhcp6::{Dhcp6Client, Dhcp6Engine};
pub use endpoint::Endpoint;
pub use interface::Interface;

/// DHCPv4 OFFER as needed to request it.
#[derive(Debug, Clone)]
pub struct Dhcp4Offer {
    pub offered_ip: Ipv4Addr,
    pub server_id: Ipv4Addr,
    pub message: v4::Message,
}

/// DHCPv4 lease information.
#[derive(Debug, Clone)]
pub struct Dhcp4Lease {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_time: u32,
    pub server_id: Ipv4Addr,
}

/// Summary of a DHCPv6 REPLY.
#[derive(Debug, Clone)]
pub struct Dhcp6Lease {
    pub server_duid: Option<Vec<u8>>,
    pub address: Option<Ipv6Addr>,
    pub prefix: Option<DelegatedPrefix>,
    pub dns_servers: Vec<Ipv6Addr>,
}

/// IPv6 delegated prefix information.
#[derive(Debug, Clone)]
pub struct DelegatedPrefix {
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
}

/// Final DHCPv6 reply together with its parsed summary.
#[derive(Debug, Clone)]
pub struct Dhcp6Reply {
    pub message: v6::Message,
    pub lease: Dhcp6Lease,
}

impl Dhcp6Reply {
    pub fn new(message: v6::Message) -> Self {
        let lease = dhcp6::parse_reply(&message);
        Self { message, lease }
    }
}

impl fmt::Display for Dhcp4Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "DHCPv4 OFFER xid={:#010x} yiaddr={} server_id={}",
            self.message.xid(),
            self.offered_ip,
            self.server_id
        )?;
        for (code, opt) in self.message.opts().iter() {
            writeln!(f, "  {code:?}: {opt:?}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Dhcp4Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DHCPv4 lease from {}", self.server_id)?;
        writeln!(f, "  address:    {}", self.address)?;
        writeln!(f, "  netmask:    {}", self.netmask)?;
        match self.gateway {
            Some(gw) => writeln!(f, "  gateway:    {gw}")?,
            None => writeln!(f, "  gateway:    none")?,
        }
        writeln!(f, "  dns:        {:?}", self.dns_servers)?;
        write!(f, "  lease time: {}s", self.lease_time)
    }
}

impl fmt::Display for Dhcp6Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", MessageDump(&self.message))?;
        match self.lease.address {
            Some(addr) => writeln!(f, "  address: {addr}")?,
            None => writeln!(f, "  address: none")?,
        }
        if let Some(pd) = &self.lease.prefix {
            writeln!(f, "  prefix:  {}/{}", pd.prefix, pd.prefix_len)?;
        }
        write!(f, "  dns:     {:?}", self.lease.dns_servers)
    }
}

/// Human-readable dump of a DHCPv6 message and its options.
pub struct MessageDump<'a>(pub &'a v6::Message);

impl fmt::Display for MessageDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = self.0;
        let xid = msg.xid();
        write!(
            f,
            "DHCPv6 {:?} xid={:02x}{:02x}{:02x}",
            msg.msg_type(),
            xid[0],
            xid[1],
            xid[2]
        )?;
        for opt in msg.opts().iter() {
            write!(f, "\n  {opt:?}")?;
        }
        Ok(())
    }
}
