//! Error types for the SOAP codec

use thiserror::Error;

/// Errors that can occur while reading or writing SOAP and GENA bodies
#[derive(Debug, Error)]
pub enum SoapError {
    /// The body is not well-formed XML or lacks a required element
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// The body is well-formed but does not match what was expected
    #[error("Unexpected content: {0}")]
    Unexpected(String),

    /// SOAP fault returned by the peer
    #[error("SOAP fault: error code {code}: {description}")]
    Fault {
        /// UPnP error code from the `UPnPError` detail
        code: u16,
        /// Error description from the `UPnPError` detail
        description: String,
    },
}

/// Convenience Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, SoapError>;
