//! Error types for the DICOM store listener

use thiserror::Error;

/// Result type alias for store-listener operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur while receiving imaging studies
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("PDU error: {0}")]
    Pdu(String),

    #[error("Command set error: {0}")]
    CommandSet(String),

    #[error("Association protocol violation: {0}")]
    Association(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Forwarding failed: {0}")]
    Forward(String),

    #[error("Idle timeout expired")]
    IdleTimeout,
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new PDU error
    pub fn pdu(msg: impl Into<String>) -> Self {
        Self::Pdu(msg.into())
    }

    /// Create a new association error
    pub fn association(msg: impl Into<String>) -> Self {
        Self::Association(msg.into())
    }

    /// Whether this error tears the connection down rather than being
    /// answered with a failure status on it
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            DimseError::Network(_) | DimseError::IdleTimeout | DimseError::Association(_)
        )
    }
}
