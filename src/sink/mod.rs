//! Result Sink Module
//!
//! This module delivers batch outcomes to the server-side view process:
//! - `BatchReport`: success (transaction hash, logs, collected attributes) or failure
//! - `ResultSink`: where reports go
//! - `WebhookSink`: POSTs reports as JSON events

mod webhook;
pub use webhook::WebhookSink;

use crate::{BatchKind, RecordId, batch::BatchOutcome, error::SinkError};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

/// Event name of every failure report
pub const FAILURE_EVENT: &str = "batch_failed";

/// Final outcome of one batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchReport {
    Success {
        kind: BatchKind,
        record_id: RecordId,
        calls_id: String,
        transaction_hash: String,
        logs: Vec<Value>,
        /// Data callback attributes collected at submission
        attributes: Map<String, Value>,
    },
    Failure {
        kind: BatchKind,
        record_id: RecordId,
        /// Absent when the submission itself was rejected
        calls_id: Option<String>,
        error: String,
    },
}

impl BatchReport {
    pub fn success(
        kind: BatchKind,
        record_id: RecordId,
        outcome: BatchOutcome,
        attributes: Map<String, Value>,
    ) -> Self {
        Self::Success {
            kind,
            record_id,
            calls_id: outcome.calls_id,
            transaction_hash: outcome.transaction_hash,
            logs: outcome.logs,
            attributes,
        }
    }

    pub fn failure(kind: BatchKind, record_id: RecordId, calls_id: Option<String>, error: impl ToString) -> Self {
        Self::Failure { kind, record_id, calls_id, error: error.to_string() }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            BatchReport::Success { kind, .. } => kind.success_event(),
            BatchReport::Failure { .. } => FAILURE_EVENT,
        }
    }

    /// Payload in the shape the view process handles for this event
    pub fn payload(&self) -> Value {
        match self {
            BatchReport::Success { kind: BatchKind::EventTypeCreated, record_id, calls_id, transaction_hash, logs, .. } => {
                json!({
                    "txHash": transaction_hash,
                    "event_type_id": record_id,
                    "calls_id": calls_id,
                    "logs": logs,
                })
            }
            BatchReport::Success { record_id, calls_id, transaction_hash, logs, attributes, .. } => {
                let mut payload = attributes.clone();
                payload.insert("tx_hash".into(), json!(transaction_hash));
                payload.insert("booking_id".into(), json!(record_id));
                payload.insert("calls_id".into(), json!(calls_id));
                payload.insert("logs".into(), json!(logs));
                Value::Object(payload)
            }
            BatchReport::Failure { kind, record_id, calls_id, error } => {
                let record_key = match kind {
                    BatchKind::EventTypeCreated => "event_type_id",
                    BatchKind::BookingCreated | BatchKind::BookingCompleted => "booking_id",
                };
                let mut payload = Map::new();
                payload.insert("error".into(), json!(error));
                payload.insert("kind".into(), json!(kind.as_str()));
                payload.insert(record_key.into(), json!(record_id));
                if let Some(calls_id) = calls_id {
                    payload.insert("calls_id".into(), json!(calls_id));
                }
                Value::Object(payload)
            }
        }
    }
}

/// Receives the final outcome of every batch
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn report(&self, report: BatchReport) -> Result<(), SinkError>;
}
