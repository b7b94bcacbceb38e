//! Error types for the SSDP layer.

use thiserror::Error;

/// Errors produced while encoding, decoding or moving SSDP datagrams.
#[derive(Debug, Error)]
pub enum SsdpError {
    /// Socket creation, multicast membership or send/receive failures
    #[error("Network error: {0}")]
    Network(String),

    /// The datagram is not a well-formed SSDP message
    #[error("Parse error: {0}")]
    Parse(String),

    /// The transport has been closed
    #[error("Transport closed")]
    Closed,
}

impl From<std::io::Error> for SsdpError {
    fn from(e: std::io::Error) -> Self {
        SsdpError::Network(e.to_string())
    }
}

/// Convenience Result type alias for SSDP operations.
pub type Result<T> = std::result::Result<T, SsdpError>;
