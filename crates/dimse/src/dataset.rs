//! Explicit-VR data-element walker
//!
//! Walks the binary payload of a store command and captures the fixed
//! set of identifying attributes. The walker advances by exactly
//! header-plus-declared-length for every element whether or not the tag
//! is recognized, re-aligns to even offsets, and treats any length that
//! would run past the buffer as the end of usable input: whatever was
//! captured up to that point is returned, never an error.

use serde::{Deserialize, Serialize};

use crate::tags::{lookup, AttributeId};

/// Fixed-length preamble ahead of the signature
pub const PREAMBLE_LEN: usize = 128;
/// Four-byte signature following the preamble
pub const SIGNATURE: &[u8; 4] = b"DICM";

/// Value representations carrying a 4-byte length after 2 reserved bytes
const LONG_FORM_VRS: [&[u8; 2]; 6] = [b"OB", b"OW", b"OF", b"SQ", b"UT", b"UN"];

/// Identifying attributes extracted from one payload.
///
/// Absence of an attribute is tolerated; its value stays empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
    pub patient_name: String,
    pub patient_id: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub modality: String,
    pub study_date: String,
    pub study_time: String,
    pub accession_number: String,
}

impl AttributeSet {
    fn set(&mut self, id: AttributeId, value: String) {
        match id {
            AttributeId::PatientName => self.patient_name = value,
            AttributeId::PatientId => self.patient_id = value,
            AttributeId::StudyInstanceUid => self.study_instance_uid = value,
            AttributeId::SeriesInstanceUid => self.series_instance_uid = value,
            AttributeId::SopInstanceUid => self.sop_instance_uid = value,
            AttributeId::Modality => self.modality = value,
            AttributeId::StudyDate => self.study_date = value,
            AttributeId::StudyTime => self.study_time = value,
            AttributeId::AccessionNumber => self.accession_number = value,
        }
    }
}

/// Walk the payload and capture known attributes.
pub fn extract_attributes(payload: &[u8]) -> AttributeSet {
    let mut attributes = AttributeSet::default();

    let mut pos = 0usize;
    if payload.len() >= PREAMBLE_LEN + SIGNATURE.len()
        && &payload[PREAMBLE_LEN..PREAMBLE_LEN + SIGNATURE.len()] == SIGNATURE
    {
        pos = PREAMBLE_LEN + SIGNATURE.len();
    }

    while pos + 8 <= payload.len() {
        let group = u16::from_le_bytes([payload[pos], payload[pos + 1]]);
        let element = u16::from_le_bytes([payload[pos + 2], payload[pos + 3]]);
        let vr = [payload[pos + 4], payload[pos + 5]];

        let (header_len, value_len) = if LONG_FORM_VRS.contains(&&vr) {
            if pos + 12 > payload.len() {
                break;
            }
            let len = u32::from_le_bytes([
                payload[pos + 8],
                payload[pos + 9],
                payload[pos + 10],
                payload[pos + 11],
            ]) as usize;
            (12, len)
        } else {
            let len = u16::from_le_bytes([payload[pos + 6], payload[pos + 7]]) as usize;
            (8, len)
        };

        let value_start = pos + header_len;
        let value_end = match value_start.checked_add(value_len) {
            Some(end) if end <= payload.len() => end,
            // Truncated or inconsistent length: stop and keep what we have.
            _ => break,
        };

        if let Some(id) = lookup(group, element) {
            let text = String::from_utf8_lossy(&payload[value_start..value_end])
                .trim_end_matches(['\0', ' '])
                .to_string();
            attributes.set(id, text);
        }

        pos = value_end;
        if pos % 2 == 1 {
            pos += 1;
        }
    }

    attributes
}
