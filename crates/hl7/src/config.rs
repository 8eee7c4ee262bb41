//! Configuration for the MLLP listener

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::DEFAULT_MLLP_PORT;

/// Configuration for the clinical-messaging listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hl7Config {
    /// Bind address for the MLLP listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port for the MLLP listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Idle timeout per connection in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Upper bound on the accumulation buffer for one message; a peer
    /// that opens a frame and never terminates it is disconnected once
    /// this many bytes have piled up
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Application name placed in outgoing acknowledgements (MSH-3)
    #[serde(default = "default_sending_application")]
    pub sending_application: String,

    /// Segment delimiter character (conventionally carriage-return)
    #[serde(default = "default_segment_delimiter")]
    pub segment_delimiter: char,

    /// Field delimiter character (conventionally pipe)
    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: char,

    /// Component delimiter character (conventionally caret)
    #[serde(default = "default_component_delimiter")]
    pub component_delimiter: char,
}

impl Default for Hl7Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            idle_timeout_secs: default_idle_timeout(),
            max_message_bytes: default_max_message_bytes(),
            sending_application: default_sending_application(),
            segment_delimiter: default_segment_delimiter(),
            field_delimiter: default_field_delimiter(),
            component_delimiter: default_component_delimiter(),
        }
    }
}

impl Hl7Config {
    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Wire delimiters for this listener
    pub fn delimiters(&self) -> crate::message::Delimiters {
        crate::message::Delimiters {
            segment: self.segment_delimiter,
            field: self.field_delimiter,
            component: self.component_delimiter,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(crate::error::Hl7Error::config(
                "Idle timeout must be greater than zero",
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(crate::error::Hl7Error::config(
                "Max message size must be greater than zero",
            ));
        }
        if self.sending_application.is_empty() {
            return Err(crate::error::Hl7Error::config(
                "Sending application name cannot be empty",
            ));
        }
        if self.field_delimiter == self.component_delimiter
            || self.segment_delimiter == self.field_delimiter
            || self.segment_delimiter == self.component_delimiter
        {
            return Err(crate::error::Hl7Error::config(
                "Segment, field and component delimiters must all differ",
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    DEFAULT_MLLP_PORT
}

fn default_idle_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_max_message_bytes() -> usize {
    1024 * 1024
}

fn default_sending_application() -> String {
    "RADGATE".to_string()
}

fn default_segment_delimiter() -> char {
    '\r'
}

fn default_field_delimiter() -> char {
    '|'
}

fn default_component_delimiter() -> char {
    '^'
}
