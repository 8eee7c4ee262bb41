//! Error types for HL7 message handling

use thiserror::Error;

/// Result type alias for HL7 operations
pub type Result<T> = std::result::Result<T, Hl7Error>;

/// Error types that can occur while receiving and handling HL7 messages
#[derive(Error, Debug)]
pub enum Hl7Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required segment: {0}")]
    MissingSegment(String),

    #[error("Forwarding failed: {0}")]
    Forward(String),

    #[error("Idle timeout expired")]
    IdleTimeout,
}

impl Hl7Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Whether this error should tear down the connection rather than
    /// produce a negative acknowledgement on it
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Hl7Error::Network(_) | Hl7Error::IdleTimeout)
    }
}
