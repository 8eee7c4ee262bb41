//! radgate: clinical protocol gateway for the radiology patient portal
//!
//! Two independent TCP listeners accept inbound clinical traffic from
//! hospital systems the portal does not control: an MLLP listener for
//! HL7 order/result messages and a minimal DICOM store listener for
//! imaging studies pushed by equipment. Parsed records are forwarded
//! to the portal backend over HTTPS; raw imaging payloads are written
//! to local storage.

pub mod config;
pub mod sink;
pub mod storage;

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::sink::HttpSink;
use crate::storage::FilesystemStorage;

/// Initialise the tracing subscriber from the configured level
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.gateway.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run the gateway until SIGINT/SIGTERM.
///
/// Failing to bind a configured port is the only fatal startup error;
/// everything after startup is connection-scoped.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!("Starting radgate '{}'", config.gateway.id);

    let sink = Arc::new(HttpSink::new(config.sink.clone()).context("building forwarding sink")?);
    let storage = Arc::new(
        FilesystemStorage::new(&config.gateway.store_dir).context("opening payload storage")?,
    );

    let mut listeners: Vec<JoinHandle<()>> = Vec::new();

    if config.gateway.hl7_enabled {
        let listener = hl7::Hl7Listener::bind(config.hl7.clone(), sink.clone())
            .await
            .context("binding MLLP listener")?;
        listeners.push(tokio::spawn(async move {
            if let Err(e) = listener.run().await {
                tracing::error!("MLLP listener stopped: {}", e);
            }
        }));
    }

    if config.gateway.dimse_enabled {
        let listener = dimse::StoreScp::bind(config.dimse.clone(), sink.clone(), storage.clone())
            .await
            .context("binding DICOM store listener")?;
        listeners.push(tokio::spawn(async move {
            if let Err(e) = listener.run().await {
                tracing::error!("DICOM store listener stopped: {}", e);
            }
        }));
    }

    if listeners.is_empty() {
        anyhow::bail!("both listeners are disabled, nothing to run");
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, closing listeners");
    for listener in listeners {
        listener.abort();
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
