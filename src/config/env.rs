//! Environment-variable configuration loading
//!
//! Every knob has a `RADGATE_`-prefixed variable; unset variables keep
//! their defaults. The sink URL is the only required setting.

use std::net::IpAddr;
use std::str::FromStr;

use super::{Config, ConfigError};

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidVar {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Build the configuration from the process environment
pub fn from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(id) = var("RADGATE_ID") {
        config.gateway.id = id;
    }
    if let Some(level) = var("RADGATE_LOG_LEVEL") {
        config.gateway.log_level = level;
    }
    if let Some(dir) = var("RADGATE_STORE_DIR") {
        config.gateway.store_dir = dir;
    }
    if let Some(enabled) = parse_var::<bool>("RADGATE_HL7_ENABLED")? {
        config.gateway.hl7_enabled = enabled;
    }
    if let Some(enabled) = parse_var::<bool>("RADGATE_DIMSE_ENABLED")? {
        config.gateway.dimse_enabled = enabled;
    }

    if let Some(addr) = parse_var::<IpAddr>("RADGATE_BIND_ADDR")? {
        config.hl7.bind_addr = addr;
        config.dimse.bind_addr = addr;
    }
    if let Some(port) = parse_var::<u16>("RADGATE_HL7_PORT")? {
        config.hl7.port = port;
    }
    if let Some(secs) = parse_var::<u64>("RADGATE_HL7_IDLE_TIMEOUT_SECS")? {
        config.hl7.idle_timeout_secs = secs;
    }
    if let Some(bytes) = parse_var::<usize>("RADGATE_HL7_MAX_MESSAGE_BYTES")? {
        config.hl7.max_message_bytes = bytes;
    }
    if let Some(port) = parse_var::<u16>("RADGATE_DIMSE_PORT")? {
        config.dimse.port = port;
    }
    if let Some(aet) = var("RADGATE_DIMSE_AET") {
        config.dimse.local_aet = aet;
    }
    if let Some(secs) = parse_var::<u64>("RADGATE_DIMSE_IDLE_TIMEOUT_SECS")? {
        config.dimse.idle_timeout_secs = secs;
    }
    if let Some(bytes) = parse_var::<usize>("RADGATE_DIMSE_MAX_TRANSFER_BYTES")? {
        config.dimse.max_transfer_bytes = bytes;
    }

    config.sink.url = var("RADGATE_SINK_URL").ok_or_else(|| {
        ConfigError::MissingVar("RADGATE_SINK_URL".to_string())
    })?;
    if let Some(token) = var("RADGATE_SINK_TOKEN") {
        config.sink.token = token;
    }
    if let Some(secs) = parse_var::<u64>("RADGATE_SINK_TIMEOUT_SECS")? {
        config.sink.timeout_secs = secs;
    }
    if let Some(tag) = var("RADGATE_SINK_SOURCE") {
        config.sink.source_tag = tag;
    }

    Ok(config)
}
