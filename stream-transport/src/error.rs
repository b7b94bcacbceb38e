//! Error types for the stream transport.

use thiserror::Error;

/// Errors raised by [`crate::StreamServer`] and [`crate::HttpStreamClient`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server could not bind a listening socket
    #[error("Bind error: {0}")]
    Bind(String),

    /// The outbound request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection, I/O or protocol failure on an outbound request
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The outbound request did not complete in time
    #[error("Request timed out")]
    Timeout,
}

/// Convenience Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
