//! Datagram transport seam and the SSDP listener tasks.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use upnp_ssdp::{OutgoingDatagram, SsdpError, SsdpSocket};

use super::Router;

/// Pause after a receive error, so a broken socket does not spin.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Sends SSDP datagrams.
///
/// Implemented by [`SsdpSocket`]; tests substitute an in-memory network.
#[async_trait]
pub trait DatagramTransport: Send + Sync + 'static {
    async fn send(&self, datagram: &OutgoingDatagram) -> Result<(), SsdpError>;
}

#[async_trait]
impl DatagramTransport for SsdpSocket {
    async fn send(&self, datagram: &OutgoingDatagram) -> Result<(), SsdpError> {
        SsdpSocket::send(self, datagram).await
    }
}

/// Feed every datagram `socket` receives to the router until the socket
/// closes or the router is gone.
pub(crate) fn spawn_listener(
    name: &'static str,
    socket: Arc<SsdpSocket>,
    router: Weak<Router>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(listener = name, "SSDP listener started");
        loop {
            match socket.recv().await {
                Ok(datagram) => {
                    let Some(router) = router.upgrade() else {
                        break;
                    };
                    router.received_datagram(datagram);
                }
                Err(SsdpError::Parse(reason)) => {
                    debug!(listener = name, %reason, "Ignoring malformed datagram");
                }
                Err(SsdpError::Closed) => break,
                Err(e) => {
                    warn!(listener = name, error = %e, "SSDP receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }
        debug!(listener = name, "SSDP listener stopped");
    })
}
