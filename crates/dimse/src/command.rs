//! Implicit-VR command-set codec for the store exchange
//!
//! The command group travels implicit-VR little-endian regardless of
//! the negotiated data-set transfer syntax: tag (two LE 16-bit words)
//! followed by a 32-bit LE length and the value. The store response is
//! built by this encoder with a computed group length, never from a
//! canned byte array.

use bytes::{BufMut, BytesMut};

use crate::error::{DimseError, Result};

/// Command field value for a store request
pub const C_STORE_RQ: u16 = 0x0001;
/// Command field value for a store response
pub const C_STORE_RSP: u16 = 0x8001;

/// Status: operation succeeded
pub const STATUS_SUCCESS: u16 = 0x0000;
/// Status: processing failure while handling the store
pub const STATUS_PROCESSING_FAILURE: u16 = 0xC000;

/// Command data-set type value meaning "no data set follows"
pub const NO_DATA_SET: u16 = 0x0101;

const TAG_GROUP_LENGTH: (u16, u16) = (0x0000, 0x0000);
const TAG_AFFECTED_SOP_CLASS: (u16, u16) = (0x0000, 0x0002);
const TAG_COMMAND_FIELD: (u16, u16) = (0x0000, 0x0100);
const TAG_MESSAGE_ID: (u16, u16) = (0x0000, 0x0110);
const TAG_MESSAGE_ID_RESPONDED_TO: (u16, u16) = (0x0000, 0x0120);
const TAG_DATA_SET_TYPE: (u16, u16) = (0x0000, 0x0800);
const TAG_STATUS: (u16, u16) = (0x0000, 0x0900);
const TAG_AFFECTED_SOP_INSTANCE: (u16, u16) = (0x0000, 0x1000);

/// A parsed command set: ordered (tag, value) pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet {
    elements: Vec<((u16, u16), Vec<u8>)>,
}

impl CommandSet {
    /// Walk an implicit-VR buffer into a command set.
    ///
    /// A length field overrunning the buffer is a malformed command.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let mut elements = Vec::new();
        let mut pos = 0usize;
        while pos + 8 <= buffer.len() {
            let group = u16::from_le_bytes([buffer[pos], buffer[pos + 1]]);
            let element = u16::from_le_bytes([buffer[pos + 2], buffer[pos + 3]]);
            let length = u32::from_le_bytes([
                buffer[pos + 4],
                buffer[pos + 5],
                buffer[pos + 6],
                buffer[pos + 7],
            ]) as usize;
            let start = pos + 8;
            let end = start
                .checked_add(length)
                .filter(|&e| e <= buffer.len())
                .ok_or_else(|| {
                    DimseError::CommandSet(format!(
                        "element ({group:04x},{element:04x}) overruns command buffer"
                    ))
                })?;
            elements.push(((group, element), buffer[start..end].to_vec()));
            pos = end;
        }
        Ok(Self { elements })
    }

    fn get(&self, tag: (u16, u16)) -> Option<&[u8]> {
        self.elements
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    fn get_u16(&self, tag: (u16, u16)) -> Option<u16> {
        self.get(tag)
            .filter(|v| v.len() >= 2)
            .map(|v| u16::from_le_bytes([v[0], v[1]]))
    }

    fn get_uid(&self, tag: (u16, u16)) -> String {
        self.get(tag)
            .map(|v| {
                String::from_utf8_lossy(v)
                    .trim_end_matches(['\0', ' '])
                    .to_string()
            })
            .unwrap_or_default()
    }

    /// Command field (request/response discriminator)
    pub fn command_field(&self) -> Option<u16> {
        self.get_u16(TAG_COMMAND_FIELD)
    }

    /// Message id of a request
    pub fn message_id(&self) -> u16 {
        self.get_u16(TAG_MESSAGE_ID).unwrap_or(0)
    }

    /// Message id a response refers to
    pub fn message_id_responded_to(&self) -> Option<u16> {
        self.get_u16(TAG_MESSAGE_ID_RESPONDED_TO)
    }

    /// Status of a response
    pub fn status(&self) -> Option<u16> {
        self.get_u16(TAG_STATUS)
    }

    /// Affected SOP class UID
    pub fn affected_sop_class(&self) -> String {
        self.get_uid(TAG_AFFECTED_SOP_CLASS)
    }

    /// Affected SOP instance UID
    pub fn affected_sop_instance(&self) -> String {
        self.get_uid(TAG_AFFECTED_SOP_INSTANCE)
    }
}

/// Builder for outgoing command sets
#[derive(Debug, Default)]
struct CommandSetBuilder {
    body: BytesMut,
}

impl CommandSetBuilder {
    fn element(&mut self, tag: (u16, u16), value: &[u8]) {
        self.body.put_u16_le(tag.0);
        self.body.put_u16_le(tag.1);
        // Values are padded to even length per the encoding rules.
        let padded = value.len() + value.len() % 2;
        self.body.put_u32_le(padded as u32);
        self.body.put_slice(value);
        if value.len() % 2 == 1 {
            self.body.put_u8(0);
        }
    }

    fn uid(&mut self, tag: (u16, u16), value: &str) {
        self.element(tag, value.as_bytes());
    }

    fn ushort(&mut self, tag: (u16, u16), value: u16) {
        self.element(tag, &value.to_le_bytes());
    }

    /// Prefix the computed group length and return the wire bytes
    fn finish(self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(self.body.len() + 12);
        out.put_u16_le(TAG_GROUP_LENGTH.0);
        out.put_u16_le(TAG_GROUP_LENGTH.1);
        out.put_u32_le(4);
        out.put_u32_le(self.body.len() as u32);
        out.put_slice(&self.body);
        out.to_vec()
    }
}

/// Build a C-STORE response command set
pub fn c_store_rsp(
    affected_sop_class: &str,
    affected_sop_instance: &str,
    message_id: u16,
    status: u16,
) -> Vec<u8> {
    let mut builder = CommandSetBuilder::default();
    if !affected_sop_class.is_empty() {
        builder.uid(TAG_AFFECTED_SOP_CLASS, affected_sop_class);
    }
    builder.ushort(TAG_COMMAND_FIELD, C_STORE_RSP);
    builder.ushort(TAG_MESSAGE_ID_RESPONDED_TO, message_id);
    builder.ushort(TAG_DATA_SET_TYPE, NO_DATA_SET);
    builder.ushort(TAG_STATUS, status);
    if !affected_sop_instance.is_empty() {
        builder.uid(TAG_AFFECTED_SOP_INSTANCE, affected_sop_instance);
    }
    builder.finish()
}

/// Build a C-STORE request command set (client half, used by tests)
pub fn c_store_rq(affected_sop_class: &str, affected_sop_instance: &str, message_id: u16) -> Vec<u8> {
    let mut builder = CommandSetBuilder::default();
    builder.uid(TAG_AFFECTED_SOP_CLASS, affected_sop_class);
    builder.ushort(TAG_COMMAND_FIELD, C_STORE_RQ);
    builder.ushort(TAG_MESSAGE_ID, message_id);
    builder.ushort(TAG_DATA_SET_TYPE, 0x0000);
    builder.uid(TAG_AFFECTED_SOP_INSTANCE, affected_sop_instance);
    builder.finish()
}
