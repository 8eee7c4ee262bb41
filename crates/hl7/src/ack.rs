//! Acknowledgement construction
//!
//! Every inbound frame is answered with a two-segment acknowledgement:
//! a header naming the response as an ACK and an MSA segment carrying
//! the accept/reject code plus the original control identifier.

use chrono::Utc;
use uuid::Uuid;

use crate::message::{Delimiters, Message};

/// Acknowledgement status codes (MSA-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Application accept
    Accept,
    /// Application error (message rejected, connection survives)
    Error,
}

impl AckStatus {
    pub fn code(self) -> &'static str {
        match self {
            AckStatus::Accept => "AA",
            AckStatus::Error => "AE",
        }
    }
}

/// Build the acknowledgement for a successfully parsed message.
///
/// Sender and receiver roles from the original header are swapped and
/// the original control identifier is echoed in MSA-2.
pub fn build_ack(sending_application: &str, original: &Message, status: AckStatus, text: Option<&str>) -> String {
    let header = original.header();
    render(
        sending_application,
        original.delimiters(),
        header.field(3), // original sender becomes our receiver
        header.field(4),
        original.control_id(),
        status,
        text,
    )
}

/// Build a rejection for input that never parsed into a message.
///
/// No control identifier is available, so MSA-2 is left empty; the
/// sender correlates by connection ordering.
pub fn build_parse_failure_ack(sending_application: &str, delimiters: Delimiters, text: &str) -> String {
    render(
        sending_application,
        delimiters,
        "",
        "",
        "",
        AckStatus::Error,
        Some(text),
    )
}

fn render(
    sending_application: &str,
    delimiters: Delimiters,
    receiving_application: &str,
    receiving_facility: &str,
    control_id: &str,
    status: AckStatus,
    text: Option<&str>,
) -> String {
    let f = delimiters.field;
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let ack_id = Uuid::new_v4().simple().to_string();

    let msh = format!(
        "MSH{f}^~\\&{f}{sending_application}{f}{f}{receiving_application}{f}{receiving_facility}{f}{timestamp}{f}{f}ACK{f}{ack_id}{f}P{f}2.3",
    );
    let msa = match text {
        Some(text) => {
            // The error text must not contain the delimiters it travels in.
            let safe: String = text
                .chars()
                .map(|c| {
                    if c == f || c == delimiters.segment {
                        ' '
                    } else {
                        c
                    }
                })
                .collect();
            format!("MSA{f}{}{f}{control_id}{f}{safe}", status.code())
        }
        None => format!("MSA{f}{}{f}{control_id}", status.code()),
    };

    format!("{msh}{seg}{msa}{seg}", seg = delimiters.segment)
}
