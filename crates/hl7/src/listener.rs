//! MLLP listener for inbound clinical messages
//!
//! One task per accepted connection; within a connection, frames are
//! parsed, handled, and acknowledged strictly in order. Sessions hold
//! no state beyond the accumulation buffer and die with the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::ack::{build_ack, build_parse_failure_ack, AckStatus};
use crate::config::Hl7Config;
use crate::framing;
use crate::handler::{dispatch, MessageSink};
use crate::message::Message;
use crate::{Hl7Error, Result};

const READ_CHUNK: usize = 4096;

/// Clinical-messaging listener
pub struct Hl7Listener {
    config: Hl7Config,
    sink: Arc<dyn MessageSink>,
    listener: TcpListener,
}

impl Hl7Listener {
    /// Bind the listener socket. Failure here is fatal to startup.
    pub async fn bind(config: Hl7Config, sink: Arc<dyn MessageSink>) -> Result<Self> {
        config.validate()?;
        let addr = SocketAddr::new(config.bind_addr, config.port);
        let listener = TcpListener::bind(addr).await?;
        info!("Starting MLLP listener on {}", listener.local_addr()?);
        Ok(Self {
            config,
            sink,
            listener,
        })
    }

    /// Address the listener actually bound to (port 0 resolves here)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped. Accepting never
    /// blocks on in-progress connections.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("Accepted MLLP connection from {}", peer_addr);
                    let config = self.config.clone();
                    let sink = Arc::clone(&self.sink);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, config, sink).await {
                            if e.is_fatal_to_connection() {
                                debug!("MLLP connection {} closed: {}", peer_addr, e);
                            } else {
                                error!("Error on MLLP connection {}: {}", peer_addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting MLLP connection: {}", e);
                }
            }
        }
    }
}

/// Session loop for one connection: accumulate bytes, peel off complete
/// frames, answer each before reading further input.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    config: Hl7Config,
    sink: Arc<dyn MessageSink>,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        while let Some(frame) = framing::next_frame(&mut buffer) {
            let ack = process_frame(&frame, &config, sink.as_ref()).await;
            stream
                .write_all(&framing::wrap_frame(ack.as_bytes()))
                .await?;
        }

        // An open frame may legitimately span many reads, but not
        // without bound.
        if buffer.len() > config.max_message_bytes {
            return Err(Hl7Error::Framing(format!(
                "unterminated frame from {} exceeds {} bytes",
                peer_addr, config.max_message_bytes
            )));
        }

        let read = timeout(config.idle_timeout(), stream.read(&mut chunk)).await;
        match read {
            Ok(Ok(0)) => {
                debug!("MLLP peer {} closed the connection", peer_addr);
                return Ok(());
            }
            Ok(Ok(n)) => buffer.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                info!(
                    "Closing idle MLLP connection from {} after {:?}",
                    peer_addr,
                    config.idle_timeout()
                );
                return Err(Hl7Error::IdleTimeout);
            }
        }
    }
}

/// Parse, handle, and produce the acknowledgement text for one frame.
/// Never returns an error: every failure becomes a negative
/// acknowledgement so the connection survives for the next message.
async fn process_frame(frame: &[u8], config: &Hl7Config, sink: &dyn MessageSink) -> String {
    let raw = String::from_utf8_lossy(frame);
    let delimiters = config.delimiters();

    let message = match Message::parse(&raw, delimiters) {
        Ok(message) => message,
        Err(e) => {
            warn!("Rejecting unparseable message: {}", e);
            return build_parse_failure_ack(&config.sending_application, delimiters, &e.to_string());
        }
    };

    match dispatch(&message, &raw, sink).await {
        Ok(disposition) => {
            debug!(
                control_id = %message.control_id(),
                ?disposition,
                "message acknowledged accept"
            );
            build_ack(&config.sending_application, &message, AckStatus::Accept, None)
        }
        Err(e) => {
            warn!(control_id = %message.control_id(), "rejecting message: {}", e);
            build_ack(
                &config.sending_application,
                &message,
                AckStatus::Error,
                Some(&e.to_string()),
            )
        }
    }
}
