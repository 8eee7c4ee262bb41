//! Configuration for the DICOM store listener

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::DEFAULT_DICOM_PORT;

/// Configuration for the image-transfer listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local Application Entity Title
    #[serde(default = "default_local_aet")]
    pub local_aet: String,

    /// Bind address for the listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port for the listener (well-known port 104 by convention; the
    /// registered alternate 11112 is the default here)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum PDU size in bytes, offered in the association accept
    #[serde(default = "default_max_pdu")]
    pub max_pdu: u32,

    /// Upper bound on one reassembled transfer (command plus payload
    /// across data-transfer frames); exceeding it aborts the association
    #[serde(default = "default_max_transfer_bytes")]
    pub max_transfer_bytes: usize,

    /// Idle timeout per connection in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: default_local_aet(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            max_pdu: default_max_pdu(),
            max_transfer_bytes: default_max_transfer_bytes(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl DimseConfig {
    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.local_aet.is_empty() || self.local_aet.len() > 16 {
            return Err(crate::error::DimseError::config(
                "Local AE title must be 1-16 characters",
            ));
        }
        if self.max_pdu < 16384 || self.max_pdu > 131072 {
            return Err(crate::error::DimseError::config(
                "Max PDU size must be between 16384 and 131072 bytes",
            ));
        }
        if self.max_transfer_bytes < self.max_pdu as usize {
            return Err(crate::error::DimseError::config(
                "Max transfer size must be at least the max PDU size",
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(crate::error::DimseError::config(
                "Idle timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_local_aet() -> String {
    "RADGATE_SCP".to_string()
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    DEFAULT_DICOM_PORT
}

fn default_max_pdu() -> u32 {
    65536
}

fn default_max_transfer_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_idle_timeout() -> u64 {
    1800 // 30 minutes, matching the messaging listener
}
