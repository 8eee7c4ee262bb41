//! Structured encoder/decoder for the association-level framing
//!
//! Four frame kinds are used by the listener: association request,
//! association accept, data-transfer, and release. Frames are built
//! and read structurally rather than from canned byte constants, so
//! the wire contract is testable without a socket. Every PDU starts
//! with a six-byte header: type, one reserved byte, and a big-endian
//! 32-bit body length.

use bytes::{BufMut, BytesMut};

use crate::error::{DimseError, Result};

pub const PDU_ASSOCIATE_RQ: u8 = 0x01;
pub const PDU_ASSOCIATE_AC: u8 = 0x02;
pub const PDU_P_DATA_TF: u8 = 0x04;
pub const PDU_RELEASE_RQ: u8 = 0x05;
pub const PDU_RELEASE_RP: u8 = 0x06;
pub const PDU_ABORT: u8 = 0x07;

const ITEM_APPLICATION_CONTEXT: u8 = 0x10;
const ITEM_PRESENTATION_CONTEXT_RQ: u8 = 0x20;
const ITEM_PRESENTATION_CONTEXT_AC: u8 = 0x21;
const SUBITEM_ABSTRACT_SYNTAX: u8 = 0x30;
const SUBITEM_TRANSFER_SYNTAX: u8 = 0x40;
const ITEM_USER_INFORMATION: u8 = 0x50;
const SUBITEM_MAX_LENGTH: u8 = 0x51;

/// DICOM application context, fixed for all associations
pub const APPLICATION_CONTEXT_UID: &str = "1.2.840.10008.3.1.1.1";
/// Implicit VR little endian transfer syntax
pub const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
/// Explicit VR little endian transfer syntax
pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

/// Upper bound on a single PDU body; anything larger is a framing error
const MAX_PDU_BODY: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 6;
const ASSOCIATE_FIXED_LEN: usize = 68;

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    AssociateRq(AssociateRq),
    AssociateAc(AssociateAc),
    PDataTf(Vec<Pdv>),
    ReleaseRq,
    ReleaseRp,
    Abort { source: u8, reason: u8 },
    /// A frame whose type byte the listener does not know
    Unknown(u8),
}

/// Association request contents the listener cares about
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociateRq {
    pub called_ae: String,
    pub calling_ae: String,
    pub presentation_contexts: Vec<ProposedContext>,
    pub max_pdu_length: Option<u32>,
}

/// One presentation context proposed by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

/// Association accept built in reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateAc {
    pub called_ae: String,
    pub calling_ae: String,
    pub accepted_contexts: Vec<AcceptedContext>,
    pub max_pdu_length: u32,
}

/// Result for one proposed presentation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedContext {
    pub id: u8,
    /// 0 = acceptance; 3 = abstract syntax not supported
    pub result: u8,
    pub transfer_syntax: String,
}

/// One presentation data value inside a data-transfer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdv {
    pub context_id: u8,
    pub is_command: bool,
    pub is_last: bool,
    pub data: Vec<u8>,
}

/// Pull the next complete PDU off the accumulation buffer.
///
/// Returns `None` while the buffer holds only a partial frame. A
/// declared body length past [`MAX_PDU_BODY`] is unrecoverable for the
/// connection and returns an error.
pub fn next_pdu(buffer: &mut BytesMut) -> Result<Option<(u8, Vec<u8>)>> {
    if buffer.len() < HEADER_LEN {
        return Ok(None);
    }
    let pdu_type = buffer[0];
    let length = u32::from_be_bytes([buffer[2], buffer[3], buffer[4], buffer[5]]) as usize;
    if length > MAX_PDU_BODY {
        return Err(DimseError::pdu(format!(
            "declared PDU length {length} exceeds limit"
        )));
    }
    if buffer.len() < HEADER_LEN + length {
        return Ok(None);
    }
    let frame = buffer.split_to(HEADER_LEN + length);
    Ok(Some((pdu_type, frame[HEADER_LEN..].to_vec())))
}

/// Decode a PDU body by its type byte
pub fn decode(pdu_type: u8, body: &[u8]) -> Result<Pdu> {
    match pdu_type {
        PDU_ASSOCIATE_RQ => Ok(Pdu::AssociateRq(AssociateRq::decode(body)?)),
        PDU_ASSOCIATE_AC => Ok(Pdu::AssociateAc(AssociateAc::decode(body)?)),
        PDU_P_DATA_TF => Ok(Pdu::PDataTf(decode_pdvs(body)?)),
        PDU_RELEASE_RQ => Ok(Pdu::ReleaseRq),
        PDU_RELEASE_RP => Ok(Pdu::ReleaseRp),
        PDU_ABORT => {
            if body.len() < 4 {
                return Err(DimseError::pdu("abort PDU truncated"));
            }
            Ok(Pdu::Abort {
                source: body[2],
                reason: body[3],
            })
        }
        other => Ok(Pdu::Unknown(other)),
    }
}

fn put_header(out: &mut BytesMut, pdu_type: u8, body_len: usize) {
    out.put_u8(pdu_type);
    out.put_u8(0);
    out.put_u32(body_len as u32);
}

fn put_item(out: &mut BytesMut, item_type: u8, body: &[u8]) {
    out.put_u8(item_type);
    out.put_u8(0);
    out.put_u16(body.len() as u16);
    out.put_slice(body);
}

fn ae_field(title: &str) -> [u8; 16] {
    let mut field = [b' '; 16];
    for (slot, byte) in field.iter_mut().zip(title.bytes()) {
        *slot = byte;
    }
    field
}

fn trim_wire_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

/// Iterate TLV items: (type, body) with a 1-byte reserved gap and a
/// big-endian 16-bit length, shared by items and sub-items.
fn items(body: &[u8]) -> Result<Vec<(u8, &[u8])>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos + 4 <= body.len() {
        let item_type = body[pos];
        let length = u16::from_be_bytes([body[pos + 2], body[pos + 3]]) as usize;
        let start = pos + 4;
        let end = start
            .checked_add(length)
            .filter(|&e| e <= body.len())
            .ok_or_else(|| DimseError::pdu(format!("item 0x{item_type:02x} truncated")))?;
        out.push((item_type, &body[start..end]));
        pos = end;
    }
    Ok(out)
}

impl AssociateRq {
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < ASSOCIATE_FIXED_LEN {
            return Err(DimseError::pdu("association request truncated"));
        }
        let mut rq = AssociateRq {
            called_ae: trim_wire_string(&body[4..20]),
            calling_ae: trim_wire_string(&body[20..36]),
            ..Default::default()
        };

        for (item_type, item) in items(&body[ASSOCIATE_FIXED_LEN..])? {
            match item_type {
                ITEM_PRESENTATION_CONTEXT_RQ => {
                    if item.len() < 4 {
                        return Err(DimseError::pdu("presentation context item truncated"));
                    }
                    let mut context = ProposedContext {
                        id: item[0],
                        abstract_syntax: String::new(),
                        transfer_syntaxes: Vec::new(),
                    };
                    for (sub_type, sub) in items(&item[4..])? {
                        match sub_type {
                            SUBITEM_ABSTRACT_SYNTAX => {
                                context.abstract_syntax = trim_wire_string(sub);
                            }
                            SUBITEM_TRANSFER_SYNTAX => {
                                context.transfer_syntaxes.push(trim_wire_string(sub));
                            }
                            _ => {}
                        }
                    }
                    rq.presentation_contexts.push(context);
                }
                ITEM_USER_INFORMATION => {
                    for (sub_type, sub) in items(item)? {
                        if sub_type == SUBITEM_MAX_LENGTH && sub.len() == 4 {
                            rq.max_pdu_length =
                                Some(u32::from_be_bytes([sub[0], sub[1], sub[2], sub[3]]));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(rq)
    }

    /// Encode a request frame. The listener never sends one; this is
    /// the client half used by the gateway's tests.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_u16(1); // protocol version
        body.put_u16(0);
        body.put_slice(&ae_field(&self.called_ae));
        body.put_slice(&ae_field(&self.calling_ae));
        body.put_slice(&[0u8; 32]);

        put_item(
            &mut body,
            ITEM_APPLICATION_CONTEXT,
            APPLICATION_CONTEXT_UID.as_bytes(),
        );

        for context in &self.presentation_contexts {
            let mut ctx = BytesMut::new();
            ctx.put_u8(context.id);
            ctx.put_slice(&[0u8; 3]);
            put_item(
                &mut ctx,
                SUBITEM_ABSTRACT_SYNTAX,
                context.abstract_syntax.as_bytes(),
            );
            for ts in &context.transfer_syntaxes {
                put_item(&mut ctx, SUBITEM_TRANSFER_SYNTAX, ts.as_bytes());
            }
            put_item(&mut body, ITEM_PRESENTATION_CONTEXT_RQ, &ctx);
        }

        if let Some(max_len) = self.max_pdu_length {
            let mut info = BytesMut::new();
            put_item(&mut info, SUBITEM_MAX_LENGTH, &max_len.to_be_bytes());
            put_item(&mut body, ITEM_USER_INFORMATION, &info);
        }

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        put_header(&mut out, PDU_ASSOCIATE_RQ, body.len());
        out.put_slice(&body);
        out.to_vec()
    }
}

impl AssociateAc {
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < ASSOCIATE_FIXED_LEN {
            return Err(DimseError::pdu("association accept truncated"));
        }
        let mut ac = AssociateAc {
            called_ae: trim_wire_string(&body[4..20]),
            calling_ae: trim_wire_string(&body[20..36]),
            accepted_contexts: Vec::new(),
            max_pdu_length: 0,
        };

        for (item_type, item) in items(&body[ASSOCIATE_FIXED_LEN..])? {
            match item_type {
                ITEM_PRESENTATION_CONTEXT_AC => {
                    if item.len() < 4 {
                        return Err(DimseError::pdu("presentation context reply truncated"));
                    }
                    let mut accepted = AcceptedContext {
                        id: item[0],
                        result: item[2],
                        transfer_syntax: String::new(),
                    };
                    for (sub_type, sub) in items(&item[4..])? {
                        if sub_type == SUBITEM_TRANSFER_SYNTAX {
                            accepted.transfer_syntax = trim_wire_string(sub);
                        }
                    }
                    ac.accepted_contexts.push(accepted);
                }
                ITEM_USER_INFORMATION => {
                    for (sub_type, sub) in items(item)? {
                        if sub_type == SUBITEM_MAX_LENGTH && sub.len() == 4 {
                            ac.max_pdu_length =
                                u32::from_be_bytes([sub[0], sub[1], sub[2], sub[3]]);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(ac)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_u16(1); // protocol version
        body.put_u16(0);
        body.put_slice(&ae_field(&self.called_ae));
        body.put_slice(&ae_field(&self.calling_ae));
        body.put_slice(&[0u8; 32]);

        put_item(
            &mut body,
            ITEM_APPLICATION_CONTEXT,
            APPLICATION_CONTEXT_UID.as_bytes(),
        );

        for context in &self.accepted_contexts {
            let mut ctx = BytesMut::new();
            ctx.put_u8(context.id);
            ctx.put_u8(0);
            ctx.put_u8(context.result);
            ctx.put_u8(0);
            put_item(
                &mut ctx,
                SUBITEM_TRANSFER_SYNTAX,
                context.transfer_syntax.as_bytes(),
            );
            put_item(&mut body, ITEM_PRESENTATION_CONTEXT_AC, &ctx);
        }

        let mut info = BytesMut::new();
        put_item(&mut info, SUBITEM_MAX_LENGTH, &self.max_pdu_length.to_be_bytes());
        put_item(&mut body, ITEM_USER_INFORMATION, &info);

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        put_header(&mut out, PDU_ASSOCIATE_AC, body.len());
        out.put_slice(&body);
        out.to_vec()
    }
}

fn decode_pdvs(body: &[u8]) -> Result<Vec<Pdv>> {
    let mut pdvs = Vec::new();
    let mut pos = 0usize;
    while pos < body.len() {
        if pos + 6 > body.len() {
            return Err(DimseError::pdu("data-transfer value truncated"));
        }
        let length =
            u32::from_be_bytes([body[pos], body[pos + 1], body[pos + 2], body[pos + 3]]) as usize;
        if length < 2 {
            return Err(DimseError::pdu("data-transfer value shorter than its header"));
        }
        let end = (pos + 4)
            .checked_add(length)
            .filter(|&e| e <= body.len())
            .ok_or_else(|| DimseError::pdu("data-transfer value overruns frame"))?;
        let control = body[pos + 5];
        pdvs.push(Pdv {
            context_id: body[pos + 4],
            is_command: control & 0x01 != 0,
            is_last: control & 0x02 != 0,
            data: body[pos + 6..end].to_vec(),
        });
        pos = end;
    }
    Ok(pdvs)
}

/// Encode a data-transfer frame from its values
pub fn encode_p_data(pdvs: &[Pdv]) -> Vec<u8> {
    let mut body = BytesMut::new();
    for pdv in pdvs {
        body.put_u32(pdv.data.len() as u32 + 2);
        body.put_u8(pdv.context_id);
        let mut control = 0u8;
        if pdv.is_command {
            control |= 0x01;
        }
        if pdv.is_last {
            control |= 0x02;
        }
        body.put_u8(control);
        body.put_slice(&pdv.data);
    }
    let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
    put_header(&mut out, PDU_P_DATA_TF, body.len());
    out.put_slice(&body);
    out.to_vec()
}

/// Encode a release request (client half, used by tests)
pub fn encode_release_rq() -> Vec<u8> {
    let mut out = BytesMut::with_capacity(HEADER_LEN + 4);
    put_header(&mut out, PDU_RELEASE_RQ, 4);
    out.put_u32(0);
    out.to_vec()
}

/// Encode the release confirmation
pub fn encode_release_rp() -> Vec<u8> {
    let mut out = BytesMut::with_capacity(HEADER_LEN + 4);
    put_header(&mut out, PDU_RELEASE_RP, 4);
    out.put_u32(0);
    out.to_vec()
}

/// Encode an abort frame
pub fn encode_abort(source: u8, reason: u8) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(HEADER_LEN + 4);
    put_header(&mut out, PDU_ABORT, 4);
    out.put_u8(0);
    out.put_u8(0);
    out.put_u8(source);
    out.put_u8(reason);
    out.to_vec()
}
