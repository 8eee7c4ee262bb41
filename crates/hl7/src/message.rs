//! HL7 v2 message model: ordered segments of positional fields
//!
//! Field access is 1-based to match HL7 numbering, through named index
//! constants rather than bare literals. The header segment is
//! special-cased during parsing because MSH-1 and MSH-2 carry the
//! delimiter characters themselves as data.

use crate::error::{Hl7Error, Result};

/// Segment type code of the message header
pub const HEADER_CODE: &str = "MSH";

/// MSH-9: message type composite (category^trigger)
pub const MSH_MESSAGE_TYPE: usize = 9;
/// MSH-10: control identifier echoed in the acknowledgement
pub const MSH_CONTROL_ID: usize = 10;

/// PID-3: patient identifier
pub const PID_PATIENT_ID: usize = 3;
/// PID-5: patient name (last^first^middle)
pub const PID_PATIENT_NAME: usize = 5;
/// PID-7: date of birth
pub const PID_BIRTH_DATE: usize = 7;
/// PID-8: administrative sex
pub const PID_SEX: usize = 8;
/// PID-13: home phone
pub const PID_PHONE: usize = 13;

/// OBR-3: filler order number (accession)
pub const OBR_ACCESSION: usize = 3;
/// OBR-4: procedure description
pub const OBR_PROCEDURE: usize = 4;
/// OBR-16: ordering provider
pub const OBR_ORDERING_PROVIDER: usize = 16;
/// OBR-25: result status
pub const OBR_RESULT_STATUS: usize = 25;
/// OBR-32: principal result interpreter
pub const OBR_PRINCIPAL_INTERPRETER: usize = 32;

/// OBX-3: observation identifier (section name)
pub const OBX_OBSERVATION_ID: usize = 3;
/// OBX-5: observation value (section text)
pub const OBX_OBSERVATION_VALUE: usize = 5;

/// MSA-1: acknowledgement code
pub const MSA_ACK_CODE: usize = 1;
/// MSA-2: echoed control identifier
pub const MSA_CONTROL_ID: usize = 2;

/// Delimiter characters for one wire encoding of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    /// Separates segments (conventionally carriage-return)
    pub segment: char,
    /// Separates fields within a segment (conventionally pipe)
    pub field: char,
    /// Separates components within a composite field (conventionally caret)
    pub component: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            segment: '\r',
            field: '|',
            component: '^',
        }
    }
}

/// A single delimited record within a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    code: String,
    fields: Vec<String>,
}

impl Segment {
    pub fn new(code: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            code: code.into(),
            fields,
        }
    }

    /// Three-character segment type code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Positional field access, 1-based per HL7 numbering.
    ///
    /// Absent fields read as the empty string so handlers never index
    /// out of bounds on short segments.
    pub fn field(&self, index: usize) -> &str {
        if index == 0 {
            return "";
        }
        self.fields.get(index - 1).map(String::as_str).unwrap_or("")
    }

    /// Number of fields present on the wire
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// An ordered sequence of segments with exactly one header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    segments: Vec<Segment>,
    delimiters: Delimiters,
}

impl Message {
    /// Parse raw message text into segments.
    ///
    /// Returns an error when the text contains no segments or the first
    /// segment is not a header; such a message must never reach a
    /// handler.
    pub fn parse(raw: &str, delimiters: Delimiters) -> Result<Self> {
        let mut segments = Vec::new();
        for line in raw.split(delimiters.segment) {
            let line = line.trim_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            segments.push(parse_segment(line, delimiters)?);
        }

        if segments.is_empty() {
            return Err(Hl7Error::parse("message contains no segments"));
        }
        if segments[0].code() != HEADER_CODE {
            return Err(Hl7Error::MissingSegment(HEADER_CODE.to_string()));
        }

        Ok(Self {
            segments,
            delimiters,
        })
    }

    /// All segments in wire order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The header segment
    pub fn header(&self) -> &Segment {
        // Parsing guarantees the first segment is MSH.
        &self.segments[0]
    }

    /// First segment with the given type code
    pub fn segment(&self, code: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.code() == code)
    }

    /// All segments with the given type code, in wire order
    pub fn segments_of<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments.iter().filter(move |s| s.code() == code)
    }

    /// Message type from MSH-9 as (category, trigger), e.g. ("ORU", "R01")
    pub fn message_type(&self) -> (String, String) {
        let raw = self.header().field(MSH_MESSAGE_TYPE);
        let mut parts = raw.split(self.delimiters.component);
        let category = parts.next().unwrap_or("").to_string();
        let trigger = parts.next().unwrap_or("").to_string();
        (category, trigger)
    }

    /// Control identifier from MSH-10
    pub fn control_id(&self) -> &str {
        self.header().field(MSH_CONTROL_ID)
    }

    /// Split a composite field into components
    pub fn components<'a>(&self, field: &'a str) -> Vec<&'a str> {
        field.split(self.delimiters.component).collect()
    }

    /// Delimiters this message was parsed with
    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }
}

/// Parse one segment line into its type code and fields.
///
/// The header is special: its fourth character is the field delimiter
/// carried as the value of MSH-1, and the run up to the next delimiter
/// is the encoding characters carried as MSH-2. Splitting those as
/// ordinary fields would shift every later field index by one.
fn parse_segment(line: &str, delimiters: Delimiters) -> Result<Segment> {
    let code: String = line.chars().take(3).collect();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Hl7Error::parse(format!("invalid segment code: {code:?}")));
    }

    let rest = &line[code.len()..];
    if code == HEADER_CODE {
        let mut chars = rest.chars();
        let sep = chars
            .next()
            .ok_or_else(|| Hl7Error::parse("header segment truncated after type code"))?;
        if sep != delimiters.field {
            return Err(Hl7Error::parse(format!(
                "header field delimiter {sep:?} does not match configured {:?}",
                delimiters.field
            )));
        }
        let after_sep: &str = chars.as_str();
        let (encoding, remainder) = match after_sep.find(sep) {
            Some(pos) => (&after_sep[..pos], &after_sep[pos + sep.len_utf8()..]),
            None => (after_sep, ""),
        };

        let mut fields = vec![sep.to_string(), encoding.to_string()];
        if !remainder.is_empty() || after_sep.contains(sep) {
            fields.extend(remainder.split(sep).map(str::to_string));
        }
        return Ok(Segment::new(code, fields));
    }

    let fields = match rest.strip_prefix(delimiters.field) {
        Some(tail) => tail
            .split(delimiters.field)
            .map(str::to_string)
            .collect(),
        None if rest.is_empty() => Vec::new(),
        None => {
            return Err(Hl7Error::parse(format!(
                "segment {code} not followed by field delimiter"
            )))
        }
    };
    Ok(Segment::new(code, fields))
}
