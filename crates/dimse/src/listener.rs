//! Store listener: association handshake, store handling, response
//!
//! One task per accepted connection. Each connection owns an
//! association session with exactly three states, transitioning one
//! way: awaiting-association, associated, closed. Payload storage and
//! downstream forwarding are injected through the [`PayloadStore`] and
//! [`StudySink`] traits.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::{c_store_rsp, CommandSet, STATUS_PROCESSING_FAILURE, STATUS_SUCCESS};
use crate::config::DimseConfig;
use crate::dataset::{extract_attributes, AttributeSet};
use crate::error::{DimseError, Result};
use crate::pdu::{
    self, AcceptedContext, AssociateAc, AssociateRq, Pdu, Pdv, EXPLICIT_VR_LE, IMPLICIT_VR_LE,
};

const READ_CHUNK: usize = 8192;

/// The payload handed to the forwarding sink for one stored study.
/// Created once per transfer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub attributes: AttributeSet,
    pub storage_path: PathBuf,
    pub received_at: DateTime<Utc>,
}

/// Downstream collaborator receiving study records.
///
/// Must tolerate concurrent calls from multiple connections.
#[async_trait]
pub trait StudySink: Send + Sync {
    async fn forward(&self, record: StudyRecord) -> Result<()>;
}

/// Durable storage for received payloads, keyed by file name
#[async_trait]
pub trait PayloadStore: Send + Sync {
    async fn store(&self, file_name: &str, payload: &[u8]) -> Result<PathBuf>;
}

/// Association session states; transitions are one-directional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssociationState {
    AwaitingAssociation,
    Associated,
    Closed,
}

/// Image-transfer listener
pub struct StoreScp {
    config: DimseConfig,
    sink: Arc<dyn StudySink>,
    store: Arc<dyn PayloadStore>,
    listener: TcpListener,
}

impl StoreScp {
    /// Bind the listener socket. Failure here is fatal to startup.
    pub async fn bind(
        config: DimseConfig,
        sink: Arc<dyn StudySink>,
        store: Arc<dyn PayloadStore>,
    ) -> Result<Self> {
        config.validate()?;
        let addr = SocketAddr::new(config.bind_addr, config.port);
        let listener = TcpListener::bind(addr).await?;
        info!(
            "Starting DICOM store listener on {} (AET: {})",
            listener.local_addr()?,
            config.local_aet
        );
        Ok(Self {
            config,
            sink,
            store,
            listener,
        })
    }

    /// Address the listener actually bound to (port 0 resolves here)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("Accepted DICOM connection from {}", peer_addr);
                    let session = Session::new(
                        self.config.clone(),
                        Arc::clone(&self.sink),
                        Arc::clone(&self.store),
                    );
                    tokio::spawn(async move {
                        if let Err(e) = session.handle(stream, peer_addr).await {
                            if e.is_fatal_to_connection() {
                                debug!("DICOM connection {} closed: {}", peer_addr, e);
                            } else {
                                error!("Error on DICOM connection {}: {}", peer_addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting DICOM connection: {}", e);
                }
            }
        }
    }
}

/// In-progress transfer on one association
#[derive(Debug, Default)]
struct Transfer {
    context_id: u8,
    command_bytes: Vec<u8>,
    command: Option<CommandSet>,
    payload: Vec<u8>,
}

impl Transfer {
    fn discard(&mut self) {
        self.command_bytes.clear();
        self.command = None;
        self.payload.clear();
    }
}

/// Per-connection association session
struct Session {
    config: DimseConfig,
    sink: Arc<dyn StudySink>,
    store: Arc<dyn PayloadStore>,
    state: AssociationState,
    transfer: Transfer,
}

impl Session {
    fn new(config: DimseConfig, sink: Arc<dyn StudySink>, store: Arc<dyn PayloadStore>) -> Self {
        Self {
            config,
            sink,
            store,
            state: AssociationState::AwaitingAssociation,
            transfer: Transfer::default(),
        }
    }

    async fn handle(mut self, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some((pdu_type, body)) = pdu::next_pdu(&mut buffer)? {
                for reply in self.process(pdu_type, &body).await? {
                    stream.write_all(&reply).await?;
                }
                if self.state == AssociationState::Closed {
                    debug!("Association with {} released", peer_addr);
                    return Ok(());
                }
            }

            let read = timeout(self.config.idle_timeout(), stream.read(&mut chunk)).await;
            match read {
                Ok(Ok(0)) => {
                    debug!("DICOM peer {} closed the connection", peer_addr);
                    return Ok(());
                }
                Ok(Ok(n)) => buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    info!(
                        "Closing idle DICOM connection from {} after {:?}",
                        peer_addr,
                        self.config.idle_timeout()
                    );
                    return Err(DimseError::IdleTimeout);
                }
            }
        }
    }

    /// Process one frame, producing zero or more reply frames
    async fn process(&mut self, pdu_type: u8, body: &[u8]) -> Result<Vec<Vec<u8>>> {
        let decoded = match pdu::decode(pdu_type, body) {
            Ok(decoded) => decoded,
            Err(e) => {
                return match self.state {
                    // Not yet associated: noise, keep waiting.
                    AssociationState::AwaitingAssociation => {
                        debug!("Ignoring undecodable frame before association: {}", e);
                        Ok(Vec::new())
                    }
                    // Frame boundary is known, so answer the failed
                    // transfer and keep the association alive.
                    AssociationState::Associated => {
                        warn!("Malformed frame during association: {}", e);
                        Ok(vec![self.failure_response()])
                    }
                    AssociationState::Closed => Ok(Vec::new()),
                };
            }
        };

        match self.state {
            AssociationState::AwaitingAssociation => self.process_awaiting(decoded),
            AssociationState::Associated => self.process_associated(decoded).await,
            AssociationState::Closed => Ok(Vec::new()),
        }
    }

    fn process_awaiting(&mut self, decoded: Pdu) -> Result<Vec<Vec<u8>>> {
        match decoded {
            Pdu::AssociateRq(rq) => {
                info!(
                    calling = %rq.calling_ae,
                    called = %rq.called_ae,
                    contexts = rq.presentation_contexts.len(),
                    "association requested"
                );
                let accept = self.build_accept(&rq);
                self.state = AssociationState::Associated;
                Ok(vec![accept.encode()])
            }
            other => {
                debug!("Ignoring {} frame before association", discriminant_name(&other));
                Ok(Vec::new())
            }
        }
    }

    async fn process_associated(&mut self, decoded: Pdu) -> Result<Vec<Vec<u8>>> {
        match decoded {
            Pdu::PDataTf(pdvs) => self.process_data(pdvs).await,
            Pdu::ReleaseRq => {
                self.state = AssociationState::Closed;
                Ok(vec![pdu::encode_release_rp()])
            }
            Pdu::Abort { source, reason } => {
                self.state = AssociationState::Closed;
                Err(DimseError::association(format!(
                    "peer aborted (source {source}, reason {reason})"
                )))
            }
            other => {
                // A second association request or any unexpected frame
                // is a protocol violation on an open association.
                self.state = AssociationState::Closed;
                let name = discriminant_name(&other);
                warn!("Aborting association on unexpected {name} frame");
                Ok(vec![pdu::encode_abort(0, 0)])
            }
        }
    }

    async fn process_data(&mut self, pdvs: Vec<Pdv>) -> Result<Vec<Vec<u8>>> {
        let mut replies = Vec::new();
        for pdv in pdvs {
            // The PDU decoder bounds single frames; this bounds the
            // reassembled transfer across frames.
            let accumulated = self.transfer.command_bytes.len() + self.transfer.payload.len();
            if accumulated + pdv.data.len() > self.config.max_transfer_bytes {
                warn!(
                    limit = self.config.max_transfer_bytes,
                    "aborting association: transfer exceeds size limit"
                );
                self.transfer.discard();
                self.state = AssociationState::Closed;
                replies.push(pdu::encode_abort(0, 0));
                return Ok(replies);
            }
            self.transfer.context_id = pdv.context_id;
            if pdv.is_command {
                self.transfer.command_bytes.extend_from_slice(&pdv.data);
                if pdv.is_last {
                    match CommandSet::parse(&self.transfer.command_bytes) {
                        Ok(command) => {
                            debug!(
                                message_id = command.message_id(),
                                "store command received"
                            );
                            self.transfer.command = Some(command);
                            self.transfer.command_bytes.clear();
                        }
                        Err(e) => {
                            warn!("Unparseable store command: {}", e);
                            replies.push(self.failure_response());
                            self.transfer.discard();
                        }
                    }
                }
            } else {
                self.transfer.payload.extend_from_slice(&pdv.data);
                if pdv.is_last {
                    let payload = std::mem::take(&mut self.transfer.payload);
                    let reply = match self.complete_store(&payload).await {
                        Ok(response) => response,
                        Err(e) => {
                            warn!("Store failed: {}", e);
                            self.failure_response()
                        }
                    };
                    replies.push(reply);
                    self.transfer.discard();
                }
            }
        }
        Ok(replies)
    }

    /// Persist the payload, forward the record, and build the success
    /// response. Any error here becomes a failure status upstream.
    async fn complete_store(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let attributes = extract_attributes(payload);

        let file_name = if attributes.sop_instance_uid.is_empty() {
            format!(
                "{}_{}.dcm",
                Utc::now().format("%Y%m%d%H%M%S"),
                Uuid::new_v4().simple()
            )
        } else {
            format!("{}.dcm", attributes.sop_instance_uid)
        };

        let storage_path = self.store.store(&file_name, payload).await?;
        info!(
            sop_instance = %attributes.sop_instance_uid,
            path = %storage_path.display(),
            bytes = payload.len(),
            "stored imaging payload"
        );

        self.sink
            .forward(StudyRecord {
                attributes,
                storage_path,
                received_at: Utc::now(),
            })
            .await?;

        Ok(self.store_response(STATUS_SUCCESS))
    }

    fn build_accept(&self, rq: &AssociateRq) -> AssociateAc {
        let accepted_contexts = rq
            .presentation_contexts
            .iter()
            .map(|context| {
                // Prefer explicit VR little endian, which is what the
                // attribute walker reads; otherwise take the first
                // proposed transfer syntax.
                let transfer_syntax = context
                    .transfer_syntaxes
                    .iter()
                    .find(|ts| ts.as_str() == EXPLICIT_VR_LE)
                    .or_else(|| context.transfer_syntaxes.first())
                    .cloned();
                match transfer_syntax {
                    Some(transfer_syntax) => AcceptedContext {
                        id: context.id,
                        result: 0,
                        transfer_syntax,
                    },
                    None => AcceptedContext {
                        id: context.id,
                        result: 3, // abstract syntax not supported
                        transfer_syntax: IMPLICIT_VR_LE.to_string(),
                    },
                }
            })
            .collect();

        AssociateAc {
            called_ae: self.config.local_aet.clone(),
            calling_ae: rq.calling_ae.clone(),
            accepted_contexts,
            max_pdu_length: self.config.max_pdu,
        }
    }

    fn store_response(&self, status: u16) -> Vec<u8> {
        let (sop_class, sop_instance, message_id) = match &self.transfer.command {
            Some(command) => (
                command.affected_sop_class(),
                command.affected_sop_instance(),
                command.message_id(),
            ),
            None => (String::new(), String::new(), 0),
        };
        let context_id = if self.transfer.context_id == 0 {
            1
        } else {
            self.transfer.context_id
        };
        pdu::encode_p_data(&[Pdv {
            context_id,
            is_command: true,
            is_last: true,
            data: c_store_rsp(&sop_class, &sop_instance, message_id, status),
        }])
    }

    fn failure_response(&mut self) -> Vec<u8> {
        let reply = self.store_response(STATUS_PROCESSING_FAILURE);
        self.transfer.discard();
        reply
    }
}

fn discriminant_name(pdu: &Pdu) -> &'static str {
    match pdu {
        Pdu::AssociateRq(_) => "associate-rq",
        Pdu::AssociateAc(_) => "associate-ac",
        Pdu::PDataTf(_) => "p-data-tf",
        Pdu::ReleaseRq => "release-rq",
        Pdu::ReleaseRp => "release-rp",
        Pdu::Abort { .. } => "abort",
        Pdu::Unknown(_) => "unknown",
    }
}
