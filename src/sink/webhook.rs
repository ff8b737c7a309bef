use super::{BatchReport, ResultSink};
use crate::{config::SinkConfig, error::SinkError};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Posts reports to the view process as `{ "event": ..., "payload": ... }`
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, url: config.url.clone() })
    }
}

#[async_trait]
impl ResultSink for WebhookSink {
    async fn report(&self, report: BatchReport) -> Result<(), SinkError> {
        let event = report.event_name();
        debug!("Reporting {} to {}", event, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "event": event, "payload": report.payload() }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status()));
        }
        Ok(())
    }
}
