//! Error types for the upnp-engine crate.

use std::fmt;

use crate::model::Udn;

/// Errors surfaced by the [`UpnpService`](crate::UpnpService) facade.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A listener or the stream server could not be started
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// Registering a device failed
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Sending through the router failed
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    /// An error occurred during shutdown
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Errors from the router's send primitives and worker pool.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The router has been shut down
    #[error("Router is disabled")]
    Disabled,

    /// The worker pool queue is full and the task was discarded
    #[error("Worker queue is full, discarded {0}")]
    QueueFull(String),

    /// A datagram could not be sent
    #[error("Datagram transport error: {0}")]
    Datagram(#[from] upnp_ssdp::SsdpError),

    /// A stream request failed after all retries
    #[error("Stream transport error: {0}")]
    Stream(#[from] stream_transport::TransportError),

    /// The target host failed recently and is still cooling down
    #[error("Target {0} is cooling down after repeated failures")]
    CoolingDown(String),

    /// No stream server is bound, so no callback or descriptor URLs exist
    #[error("No stream server available")]
    NoStreamServer,
}

/// The message does not map to any protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolCreationError {
    #[error("Unsupported datagram: {0}")]
    UnsupportedDatagram(String),

    #[error("Unsupported stream request: {0}")]
    UnsupportedStream(String),
}

/// Errors raised when registering devices.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// A device with this UDN is already registered
    #[error("Device already registered: {0}")]
    DuplicateUdn(Udn),

    /// The device model violates an invariant
    #[error("Device is invalid: {0}")]
    Invalid(#[from] ValidationErrors),

    /// Local devices must carry a local origin, remote devices a remote one
    #[error("Device origin does not match: {0}")]
    WrongOrigin(Udn),

    /// The registry is shutting down
    #[error("Registry is shutting down")]
    ShuttingDown,
}

/// A single model validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Element of the model the error refers to, e.g. `Action(SetTarget)`
    pub element: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.element, self.message)
    }
}

/// All validation failures of one model element, collected rather than
/// reported one at a time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Control error codes defined by UDA, plus vendor codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidAction,
    InvalidArgs,
    ActionFailed,
    ArgumentValueInvalid,
    ArgumentValueOutOfRange,
    StringArgumentTooLong,
    Custom(u16),
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::InvalidAction => 401,
            ErrorCode::InvalidArgs => 402,
            ErrorCode::ActionFailed => 501,
            ErrorCode::ArgumentValueInvalid => 600,
            ErrorCode::ArgumentValueOutOfRange => 601,
            ErrorCode::StringArgumentTooLong => 605,
            ErrorCode::Custom(code) => *code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            401 => ErrorCode::InvalidAction,
            402 => ErrorCode::InvalidArgs,
            501 => ErrorCode::ActionFailed,
            600 => ErrorCode::ArgumentValueInvalid,
            601 => ErrorCode::ArgumentValueOutOfRange,
            605 => ErrorCode::StringArgumentTooLong,
            other => ErrorCode::Custom(other),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidAction => "Invalid Action",
            ErrorCode::InvalidArgs => "Invalid Args",
            ErrorCode::ActionFailed => "Action Failed",
            ErrorCode::ArgumentValueInvalid => "Argument Value Invalid",
            ErrorCode::ArgumentValueOutOfRange => "Argument Value Out of Range",
            ErrorCode::StringArgumentTooLong => "String Argument Too Long",
            ErrorCode::Custom(_) => "Vendor Error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// Failure of an action invocation, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ActionError {
    pub code: ErrorCode,
    pub message: String,
}

impl ActionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Malformed or unexpected message content.
    pub fn unsupported_data(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ActionFailed, message)
    }
}

/// Errors from subscribe, renew and unsubscribe.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The service is not known or has no event subscription URL
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// No subscription with this SID exists
    #[error("Subscription not found: {0}")]
    NotFound(String),

    /// The publisher answered with an error status
    #[error("Subscription rejected with status {0}")]
    Rejected(u16),

    /// The response lacked a required header
    #[error("Invalid subscription response: {0}")]
    InvalidResponse(String),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),
}

/// Errors from parsing or generating descriptors.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Failed to parse descriptor: {0}")]
    Parse(String),

    #[error("Invalid descriptor content: {0}")]
    Invalid(String),

    #[error("Failed to generate descriptor: {0}")]
    Generate(String),

    #[error("Descriptor retrieval failed: {0}")]
    Retrieval(String),
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        for code in [401, 402, 501, 600, 601, 605] {
            assert_eq!(ErrorCode::from_code(code).code(), code);
        }
        assert_eq!(ErrorCode::from_code(718), ErrorCode::Custom(718));
        assert_eq!(ErrorCode::Custom(718).code(), 718);
    }

    #[test]
    fn test_action_error_display() {
        let error = ActionError::new(ErrorCode::ArgumentValueInvalid, "Bad value for Target");
        assert_eq!(
            error.to_string(),
            "600 (Argument Value Invalid): Bad value for Target"
        );
    }

    #[test]
    fn test_validation_errors_display() {
        let errors = ValidationErrors(vec![
            ValidationError::new("Action(GetStatus)", "unknown state variable"),
            ValidationError::new("Device(uuid:x)", "missing device type"),
        ]);
        assert_eq!(
            errors.to_string(),
            "Action(GetStatus): unknown state variable; Device(uuid:x): missing device type"
        );
    }
}
