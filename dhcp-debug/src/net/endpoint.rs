//! UDP endpoint bound to a single network interface.

use super::Interface;
use crate::error::NetworkError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddrV4, SocketAddrV6};
use std::os::fd::IntoRawFd;
use tokio::net::UdpSocket;
use tracing::debug;

/// Socket owned by exactly one session.
///
/// The socket is released by [`Endpoint::close`]. Only the first call does any
/// work; later calls are no-ops, so every exit path of a session may call it.
#[derive(Debug)]
pub struct Endpoint {
    iface: Interface,
    socket: Option<UdpSocket>,
}

impl Endpoint {
    /// Bind an IPv4 UDP socket to `local` on `iface`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_v4(
        iface: &Interface,
        local: SocketAddrV4,
        broadcast: bool,
    ) -> Result<Self, NetworkError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;
        socket.set_broadcast(broadcast)?;
        socket.bind_device(Some(iface.name.as_bytes()))?;
        socket.bind(&local.into())?;

        Self::from_socket(iface, socket)
    }

    /// Bind an IPv6 UDP socket to `local` on `iface`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_v6(iface: &Interface, local: SocketAddrV6) -> Result<Self, NetworkError> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_only_v6(true)?;
        socket.set_reuse_address(true)?;
        socket.bind_device(Some(iface.name.as_bytes()))?;
        socket.bind(&local.into())?;

        Self::from_socket(iface, socket)
    }

    fn from_socket(iface: &Interface, socket: Socket) -> Result<Self, NetworkError> {
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket.into())?;

        debug!(
            iface = %iface.name,
            local = ?socket.local_addr().ok(),
            "Endpoint bound"
        );

        Ok(Self {
            iface: iface.clone(),
            socket: Some(socket),
        })
    }

    pub fn interface(&self) -> &Interface {
        &self.iface
    }

    /// The open socket, or [`NetworkError::Closed`] after `close`.
    pub fn socket(&self) -> Result<&UdpSocket, NetworkError> {
        self.socket.as_ref().ok_or(NetworkError::Closed)
    }

    /// Release the socket, reporting errors from the underlying `close(2)`.
    pub fn close(&mut self) -> Result<(), NetworkError> {
        let Some(socket) = self.socket.take() else {
            return Ok(());
        };

        let fd = socket.into_std()?.into_raw_fd();
        nix::unistd::close(fd)?;

        debug!(iface = %self.iface.name, "Endpoint closed");
        Ok(())
    }
}
