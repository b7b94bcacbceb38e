//! SSDP datagram codec and multicast transport
//!
//! This crate provides the byte-level half of UPnP discovery: decoding and
//! encoding NOTIFY, M-SEARCH and search-response datagrams, and tokio UDP sockets
//! that join the SSDP multicast group. It has no knowledge of devices or of the
//! discovery state machine, which live in the engine crate.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use upnp_ssdp::{OutgoingDatagram, SsdpMessage, SsdpSocket};
//!
//! # async fn run() -> upnp_ssdp::Result<()> {
//! let socket = SsdpSocket::unicast(Ipv4Addr::UNSPECIFIED)?;
//! socket
//!     .send(&OutgoingDatagram::multicast(SsdpMessage::search("ssdp:all", 3)))
//!     .await?;
//!
//! loop {
//!     let datagram = socket.recv().await?;
//!     println!("{} from {}", datagram.message, datagram.source);
//! }
//! # }
//! ```

mod error;
pub mod message;
mod transport;

pub use error::{Result, SsdpError};
pub use message::{
    header, multicast_socket_addr, parse_max_age, Headers, IncomingDatagram, OutgoingDatagram,
    SsdpMessage, StartLine, MAN_DISCOVER, MULTICAST_ADDRESS, SSDP_PORT,
};
pub use transport::SsdpSocket;
