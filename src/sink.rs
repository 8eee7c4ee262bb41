//! HTTP forwarding sink
//!
//! Forward records travel as a JSON POST to the portal's ingest
//! endpoint, authorized with a bearer credential. The sink is shared
//! by every connection of both listeners and is safe for concurrent
//! calls; each record is posted independently with no retry here.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::SinkConfig;

/// Error type for forwarding failures
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Downstream returned status {0}")]
    Status(reqwest::StatusCode),
}

/// JSON envelope wrapping every forwarded record
#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    source: &'a str,
    #[serde(flatten)]
    record: T,
}

/// Forwarding sink posting records to the portal backend
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    config: SinkConfig,
}

impl HttpSink {
    pub fn new(config: SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    async fn post<T: Serialize>(&self, record: T) -> Result<(), SinkError> {
        let envelope = Envelope {
            source: &self.config.source_tag,
            record,
        };
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.token)
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status));
        }
        debug!(status = %status, "record forwarded");
        Ok(())
    }
}

#[async_trait]
impl hl7::MessageSink for HttpSink {
    async fn forward(&self, record: hl7::ClinicalRecord) -> hl7::Result<()> {
        self.post(record)
            .await
            .map_err(|e| hl7::Hl7Error::Forward(e.to_string()))
    }
}

#[async_trait]
impl dimse::StudySink for HttpSink {
    async fn forward(&self, record: dimse::StudyRecord) -> dimse::Result<()> {
        self.post(record)
            .await
            .map_err(|e| dimse::DimseError::Forward(e.to_string()))
    }
}
