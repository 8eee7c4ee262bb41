//! Message-type dispatch and forward-record construction
//!
//! A fixed table maps the three known message categories to handlers;
//! anything else is logged and skipped without error. Each handler
//! reads its fields through the named index constants in
//! [`crate::message`] and produces a [`ClinicalRecord`] handed to the
//! injected [`MessageSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Hl7Error, Result};
use crate::message::{
    Message, OBR_ACCESSION, OBR_ORDERING_PROVIDER, OBR_PRINCIPAL_INTERPRETER, OBR_PROCEDURE,
    OBR_RESULT_STATUS, OBX_OBSERVATION_ID, OBX_OBSERVATION_VALUE, PID_BIRTH_DATE, PID_PATIENT_ID,
    PID_PATIENT_NAME, PID_PHONE, PID_SEX,
};

/// Message category for result/report notifications
pub const CATEGORY_RESULT: &str = "ORU";
/// Message category for new orders
pub const CATEGORY_ORDER: &str = "ORM";
/// Message category for demographic updates
pub const CATEGORY_DEMOGRAPHIC: &str = "ADT";

/// Patient demographics pulled from a PID segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFields {
    pub patient_id: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub birth_date: String,
    pub sex: String,
    pub phone: String,
}

/// Order fields pulled from an OBR segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFields {
    pub accession: String,
    pub procedure: String,
    pub ordering_provider: String,
}

/// Narrative report sections collected from OBX segments.
///
/// Repeated observations for the same section concatenate with a
/// newline; observation names that match no known section are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSections {
    pub impression: String,
    pub findings: String,
    pub technique: String,
    pub history: String,
}

impl ReportSections {
    fn append(slot: &mut String, text: &str) {
        if !slot.is_empty() {
            slot.push('\n');
        }
        slot.push_str(text);
    }

    /// Route one observation into its section by case-insensitive
    /// substring match on the observation name.
    fn collect(&mut self, observation_id: &str, text: &str) {
        let name = observation_id.to_ascii_lowercase();
        if name.contains("impression") {
            Self::append(&mut self.impression, text);
        } else if name.contains("finding") {
            Self::append(&mut self.findings, text);
        } else if name.contains("technique") {
            Self::append(&mut self.technique, text);
        } else if name.contains("history") || name.contains("clinical") {
            Self::append(&mut self.history, text);
        } else {
            debug!(observation = %observation_id, "ignoring unrecognized observation section");
        }
    }
}

/// The payload handed to the forwarding sink for one parsed message.
/// Created once per message and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClinicalRecord {
    /// A finished result/report notification
    Result {
        control_id: String,
        patient_id: String,
        accession: String,
        reporting_clinician: String,
        result_status: String,
        sections: ReportSections,
        raw: String,
        received_at: DateTime<Utc>,
    },
    /// A new order: create-or-update keyed on patient identifier
    NewOrder {
        control_id: String,
        patient: PatientFields,
        order: OrderFields,
        raw: String,
        received_at: DateTime<Utc>,
    },
    /// Updatable demographics only, keyed on patient identifier
    DemographicUpdate {
        control_id: String,
        patient: PatientFields,
        raw: String,
        received_at: DateTime<Utc>,
    },
}

/// Outcome of dispatching one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A record was built and forwarded
    Forwarded,
    /// Unknown category; nothing to forward, still acknowledged accept
    Skipped,
}

/// Downstream collaborator receiving forward records.
///
/// Implementations must tolerate concurrent calls from multiple
/// connections; this is the only synchronization boundary.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn forward(&self, record: ClinicalRecord) -> Result<()>;
}

/// Dispatch a parsed message to its category handler and forward the
/// resulting record. Forwarding happens before the acknowledgement is
/// written, so a sink failure surfaces as a rejection to the sender.
pub async fn dispatch(message: &Message, raw: &str, sink: &dyn MessageSink) -> Result<Disposition> {
    let (category, trigger) = message.message_type();
    let record = match category.as_str() {
        CATEGORY_RESULT => handle_result(message, raw)?,
        CATEGORY_ORDER => handle_order(message, raw)?,
        CATEGORY_DEMOGRAPHIC => handle_demographic_update(message, raw)?,
        other => {
            info!(category = %other, trigger = %trigger, "no handler for message category, skipping");
            return Ok(Disposition::Skipped);
        }
    };

    sink.forward(record).await?;
    Ok(Disposition::Forwarded)
}

fn patient_fields(message: &Message) -> Result<PatientFields> {
    let pid = message
        .segment("PID")
        .ok_or_else(|| Hl7Error::MissingSegment("PID".to_string()))?;

    let name = pid.field(PID_PATIENT_NAME);
    let parts = message.components(name);
    let component = |i: usize| parts.get(i).copied().unwrap_or("").to_string();

    Ok(PatientFields {
        patient_id: pid.field(PID_PATIENT_ID).to_string(),
        last_name: component(0),
        first_name: component(1),
        middle_name: component(2),
        birth_date: pid.field(PID_BIRTH_DATE).to_string(),
        sex: pid.field(PID_SEX).to_string(),
        phone: pid.field(PID_PHONE).to_string(),
    })
}

fn handle_result(message: &Message, raw: &str) -> Result<ClinicalRecord> {
    let obr = message
        .segment("OBR")
        .ok_or_else(|| Hl7Error::MissingSegment("OBR".to_string()))?;

    let patient_id = message
        .segment("PID")
        .map(|pid| pid.field(PID_PATIENT_ID).to_string())
        .unwrap_or_default();

    let mut sections = ReportSections::default();
    for obx in message.segments_of("OBX") {
        sections.collect(obx.field(OBX_OBSERVATION_ID), obx.field(OBX_OBSERVATION_VALUE));
    }

    Ok(ClinicalRecord::Result {
        control_id: message.control_id().to_string(),
        patient_id,
        accession: obr.field(OBR_ACCESSION).to_string(),
        reporting_clinician: obr.field(OBR_PRINCIPAL_INTERPRETER).to_string(),
        result_status: obr.field(OBR_RESULT_STATUS).to_string(),
        sections,
        raw: raw.to_string(),
        received_at: Utc::now(),
    })
}

fn handle_order(message: &Message, raw: &str) -> Result<ClinicalRecord> {
    let patient = patient_fields(message)?;
    let obr = message
        .segment("OBR")
        .ok_or_else(|| Hl7Error::MissingSegment("OBR".to_string()))?;

    Ok(ClinicalRecord::NewOrder {
        control_id: message.control_id().to_string(),
        patient,
        order: OrderFields {
            accession: obr.field(OBR_ACCESSION).to_string(),
            procedure: obr.field(OBR_PROCEDURE).to_string(),
            ordering_provider: obr.field(OBR_ORDERING_PROVIDER).to_string(),
        },
        raw: raw.to_string(),
        received_at: Utc::now(),
    })
}

fn handle_demographic_update(message: &Message, raw: &str) -> Result<ClinicalRecord> {
    let patient = patient_fields(message)?;

    Ok(ClinicalRecord::DemographicUpdate {
        control_id: message.control_id().to_string(),
        patient,
        raw: raw.to_string(),
        received_at: Utc::now(),
    })
}
