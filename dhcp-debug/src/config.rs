//! Session configuration.
//!
//! Built once from command line values and validated before any socket is
//! opened. Addresses are resolved here so the engines only see socket
//! addresses of the right family.

use crate::error::ConstructionError;
use crate::net::Interface;
use crate::net::dhcp6::DHCP6_SERVER_PORT;
use crate::session::MessageMode;
use std::io;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use std::time::Duration;

/// Everything needed to construct one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub iface: String,
    pub timeout: Duration,
    pub release: bool,
    pub debug: bool,
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Clone)]
pub enum ProtocolConfig {
    V4(Dhcp4Config),
    V6(Dhcp6Config),
}

/// DHCPv4 addressing overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dhcp4Config {
    /// Unicast source address; `None` binds the broadcast client port.
    pub client: Option<SocketAddrV4>,
    /// Server address; `None` broadcasts.
    pub server: Option<SocketAddrV4>,
}

/// DHCPv6 addressing overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dhcp6Config {
    /// Destination instead of the All_DHCP_Relay_Agents_and_Servers group.
    pub server: Option<SocketAddrV6>,
    pub mode: MessageMode,
}

impl SessionConfig {
    /// DHCPv4 session.
    ///
    /// `client_host` empty means broadcast mode. The server override is only
    /// applied when `host` is non-empty and `port` is non-zero.
    #[allow(clippy::too_many_arguments)]
    pub fn v4(
        iface: &str,
        client_host: &str,
        client_port: u16,
        host: &str,
        port: u16,
        timeout_ms: u64,
        release: bool,
        debug: bool,
    ) -> Result<Self, ConstructionError> {
        let client = if client_host.is_empty() {
            None
        } else {
            Some(resolve_v4(client_host, client_port)?)
        };
        let server = if host.is_empty() || port == 0 {
            None
        } else {
            Some(resolve_v4(host, port)?)
        };

        Self::new(
            iface,
            timeout_ms,
            release,
            debug,
            ProtocolConfig::V4(Dhcp4Config { client, server }),
        )
    }

    /// DHCPv6 session. `num_msg == 4` selects the four-message exchange.
    pub fn v6(
        iface: &str,
        broadcast_addr: &str,
        num_msg: u32,
        timeout_ms: u64,
        release: bool,
        debug: bool,
    ) -> Result<Self, ConstructionError> {
        let server = if broadcast_addr.is_empty() {
            None
        } else {
            // Deliberately the DHCPv6 server port (547), not 67.
            Some(resolve_v6(broadcast_addr, DHCP6_SERVER_PORT)?)
        };

        Self::new(
            iface,
            timeout_ms,
            release,
            debug,
            ProtocolConfig::V6(Dhcp6Config {
                server,
                mode: MessageMode::from_count(num_msg),
            }),
        )
    }

    fn new(
        iface: &str,
        timeout_ms: u64,
        release: bool,
        debug: bool,
        protocol: ProtocolConfig,
    ) -> Result<Self, ConstructionError> {
        if iface.is_empty() {
            return Err(ConstructionError::EmptyInterface);
        }
        if timeout_ms == 0 {
            return Err(ConstructionError::InvalidTimeout);
        }

        Ok(Self {
            iface: iface.to_string(),
            timeout: Duration::from_millis(timeout_ms),
            release,
            debug,
            protocol,
        })
    }

    /// Look up the configured interface.
    pub fn resolve_interface(&self) -> Result<Interface, ConstructionError> {
        Interface::by_name(&self.iface).map_err(|source| ConstructionError::UnknownInterface {
            name: self.iface.clone(),
            source,
        })
    }
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConstructionError> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    (host, port)
        .to_socket_addrs()
        .map(|addrs| addrs.collect())
        .map_err(|e: io::Error| ConstructionError::InvalidAddress {
            addr: host.to_string(),
            reason: e.to_string(),
        })
}

fn resolve_v4(host: &str, port: u16) -> Result<SocketAddrV4, ConstructionError> {
    resolve(host, port)?
        .into_iter()
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| ConstructionError::InvalidAddress {
            addr: host.to_string(),
            reason: "no IPv4 address".to_string(),
        })
}

fn resolve_v6(host: &str, port: u16) -> Result<SocketAddrV6, ConstructionError> {
    resolve(host, port)?
        .into_iter()
        .find_map(|addr| match addr {
            SocketAddr::V6(v6) => Some(v6),
            SocketAddr::V4(_) => None,
        })
        .ok_or_else(|| ConstructionError::InvalidAddress {
            addr: host.to_string(),
            reason: "no IPv6 address".to_string(),
        })
}
