//! Minimal DICOM store listener for the radgate gateway
//!
//! Receives imaging studies pushed over TCP by imaging equipment:
//! negotiates the association handshake, reassembles the data-transfer
//! frames of a store command, extracts identifying attributes by
//! walking the binary encoding, persists the raw payload, and answers
//! with a status response. Storage and downstream forwarding are
//! injected through the [`listener::PayloadStore`] and
//! [`listener::StudySink`] traits.

pub mod command;
pub mod config;
pub mod dataset;
pub mod error;
pub mod listener;
pub mod pdu;
pub mod tags;

// Re-export commonly used types
pub use config::DimseConfig;
pub use dataset::{extract_attributes, AttributeSet};
pub use error::{DimseError, Result};
pub use listener::{PayloadStore, StoreScp, StudyRecord, StudySink};

/// Default DICOM port (the registered alternate; port 104 by convention
/// needs elevated privileges)
pub const DEFAULT_DICOM_PORT: u16 = 11112;
