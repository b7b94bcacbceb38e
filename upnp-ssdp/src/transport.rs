//! Tokio UDP sockets for SSDP.
//!
//! Two kinds of socket are used. The multicast listener binds the SSDP port,
//! joins the group and receives NOTIFY and M-SEARCH traffic. The unicast socket
//! binds an ephemeral port; it sends searches and notifications and receives the
//! unicast search responses addressed to it. Keeping them apart avoids the kernel
//! load-balancing datagrams between two sockets bound to port 1900.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::{Result, SsdpError};
use crate::message::{
    IncomingDatagram, OutgoingDatagram, SsdpMessage, MAX_DATAGRAM_SIZE, MULTICAST_ADDRESS,
    SSDP_PORT,
};

/// Multicast TTL used for outgoing datagrams, UDA recommends 2-4.
const MULTICAST_TTL: u32 = 4;

/// An SSDP socket.
#[derive(Debug)]
pub struct SsdpSocket {
    socket: UdpSocket,
    interface: Ipv4Addr,
}

impl SsdpSocket {
    /// Bind `0.0.0.0:1900` and join the SSDP group on `interface`.
    ///
    /// Pass [`Ipv4Addr::UNSPECIFIED`] to let the OS pick the interface.
    pub fn multicast(interface: Ipv4Addr) -> Result<Self> {
        Self::multicast_on_port(interface, SSDP_PORT)
    }

    /// Same as [`SsdpSocket::multicast`] on an arbitrary port, for tests.
    pub fn multicast_on_port(interface: Ipv4Addr, port: u16) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| SsdpError::Network(format!("Failed to create UDP socket: {}", e)))?;
        socket.set_reuse_address(true)?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&bind_addr.into())
            .map_err(|e| SsdpError::Network(format!("Failed to bind {}: {}", bind_addr, e)))?;

        socket
            .join_multicast_v4(&MULTICAST_ADDRESS, &interface)
            .map_err(|e| {
                SsdpError::Network(format!(
                    "Failed to join {} on {}: {}",
                    MULTICAST_ADDRESS, interface, e
                ))
            })?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        debug!(%interface, port, "SSDP multicast listener bound");

        Ok(Self { socket, interface })
    }

    /// Bind an ephemeral unicast port on `interface`.
    pub fn unicast(interface: Ipv4Addr) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| SsdpError::Network(format!("Failed to create UDP socket: {}", e)))?;

        let bind_addr = SocketAddrV4::new(interface, 0);
        socket
            .bind(&bind_addr.into())
            .map_err(|e| SsdpError::Network(format!("Failed to bind {}: {}", bind_addr, e)))?;
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        socket.set_multicast_loop_v4(true)?;
        if !interface.is_unspecified() {
            if let Err(e) = socket.set_multicast_if_v4(&interface) {
                debug!(%interface, error = %e, "Cannot select multicast interface, using the default");
            }
        }
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        debug!(local = ?socket.local_addr().ok(), "SSDP unicast socket bound");

        Ok(Self { socket, interface })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Encode and send a datagram.
    pub async fn send(&self, datagram: &OutgoingDatagram) -> Result<()> {
        let payload = datagram.message.encode();
        self.socket
            .send_to(payload.as_bytes(), datagram.destination)
            .await
            .map_err(|e| {
                SsdpError::Network(format!("Failed to send to {}: {}", datagram.destination, e))
            })?;
        trace!(destination = %datagram.destination, "Sent SSDP datagram:\n{}", payload);
        Ok(())
    }

    /// Receive and decode the next datagram.
    ///
    /// A datagram that fails to decode is returned as [`SsdpError::Parse`]; the
    /// socket remains usable.
    pub async fn recv(&self) -> Result<IncomingDatagram> {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let (size, source) = self.socket.recv_from(&mut buffer).await?;
        trace!(%source, size, "Received SSDP datagram");

        let message = SsdpMessage::parse(&buffer[..size])?;
        let local_address = if self.interface.is_unspecified() {
            None
        } else {
            Some(IpAddr::V4(self.interface))
        };

        Ok(IncomingDatagram {
            message,
            source,
            local_address,
        })
    }
}
