//! HL7 v2 clinical-messaging listener for the radgate gateway
//!
//! Receives order/result notifications from a Radiology Information
//! System over MLLP-framed TCP, parses them into segments and fields,
//! dispatches by message category, and acknowledges every frame on the
//! same connection. The downstream forwarding sink is injected through
//! the [`handler::MessageSink`] trait.

pub mod ack;
pub mod config;
pub mod error;
pub mod framing;
pub mod handler;
pub mod listener;
pub mod message;

// Re-export commonly used types
pub use ack::AckStatus;
pub use config::Hl7Config;
pub use error::{Hl7Error, Result};
pub use handler::{ClinicalRecord, Disposition, MessageSink};
pub use listener::Hl7Listener;
pub use message::{Delimiters, Message, Segment};

/// Default MLLP port
pub const DEFAULT_MLLP_PORT: u16 = 2575;
