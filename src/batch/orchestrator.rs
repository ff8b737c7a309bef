//! Batch Orchestrator Module
//!
//! This module connects the hook events to the submitter, the tracker, the
//! registry and the result sink. All three hook events go through the same
//! pipeline.
//!
//! # Flow
//! 1. Build the ordered calls for the event (`CallBuilder`)
//! 2. Submit them as one batch; a rejection is reported and returned
//! 3. Register a cancellation token and record the batch
//! 4. Spawn the poll loop, which reports the outcome to the sink when done

use crate::{
    BatchHandle, BatchKind, HookEvent, RecordId,
    batch::{BatchOutcome, CallBuilder, TransactionBatchSubmitter},
    error::BatchError,
    registry::Registry,
    sink::{BatchReport, ResultSink},
    state::{BatchTracker, TrackedBatch},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Batch orchestrator
///
/// Cheap to clone; every poll loop runs on its own clone.
#[derive(Clone)]
pub struct BatchOrchestrator {
    builder: CallBuilder,
    submitter: Arc<TransactionBatchSubmitter>,
    sink: Arc<dyn ResultSink>,
    registry: Registry,
}

impl BatchOrchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    /// * `builder` - Call list construction per hook event
    /// * `submitter` - Submits batches and polls their status
    /// * `sink` - Receives the outcome of every batch
    /// * `registry` - Persistent record of batches
    pub fn new(
        builder: CallBuilder,
        submitter: Arc<TransactionBatchSubmitter>,
        sink: Arc<dyn ResultSink>,
        registry: Registry,
    ) -> Self {
        Self { builder, submitter, sink, registry }
    }

    fn tracker(&self) -> &BatchTracker {
        self.submitter.tracker()
    }

    /// Submit the batch for `event` and follow it in the background
    ///
    /// # Returns
    /// * `Ok((handle, task))` once the wallet accepted the batch; `task`
    ///   finishes after the outcome was reported
    /// * `Err` if the batch was rejected (already reported to the sink)
    pub async fn dispatch(&self, event: HookEvent) -> Result<(BatchHandle, JoinHandle<()>), BatchError> {
        let batch = self.builder.build(&event);
        let (kind, record_id) = (batch.kind, batch.record_id.clone());
        let call_count = batch.calls.len();

        info!("Dispatching {} batch for record {}", kind.as_str(), record_id);

        let handle = match self
            .submitter
            .submit(batch.calls, batch.from, batch.chain_id, batch.capabilities, batch.atomic_required)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!("{} batch for record {} rejected: {}", kind.as_str(), record_id, e);
                self.report(BatchReport::failure(kind, record_id, None, &e)).await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        self.tracker().track(&handle.calls_id, cancel.clone()).await;

        if let Err(e) = self
            .registry
            .record_submitted(&handle.calls_id, kind, &record_id, &batch.from, call_count)
            .await
        {
            error!("Failed to record batch {}: {}", handle.calls_id, e);
        }

        let this = self.clone();
        let followed = handle.clone();
        let task = tokio::spawn(async move { this.follow(kind, record_id, followed, cancel).await });

        Ok((handle, task))
    }

    /// Stop polling `calls_id`
    ///
    /// The wallet may still execute the batch; only this relay stops
    /// watching it. Returns `false` if the batch is not being polled.
    pub async fn cancel(&self, calls_id: &str) -> bool {
        let cancelled = self.tracker().cancel(calls_id).await;
        if cancelled {
            info!("Cancelled polling for batch {}", calls_id);
        }
        cancelled
    }

    /// Lifecycle of `calls_id`
    ///
    /// Batches evicted from memory are looked up in the registry.
    pub async fn status(&self, calls_id: &str) -> Option<TrackedBatch> {
        if let Some(tracked) = self.tracker().get(calls_id).await {
            return Some(tracked);
        }

        match self.registry.get(calls_id).await {
            Ok(record) => record.map(TrackedBatch::from),
            Err(e) => {
                error!("Failed to look up batch {} in the registry: {}", calls_id, e);
                None
            }
        }
    }

    /// Poll `handle` to a terminal status and report the outcome
    async fn follow(&self, kind: BatchKind, record_id: RecordId, handle: BatchHandle, cancel: CancellationToken) {
        let calls_id = handle.calls_id.clone();
        let result = self
            .submitter
            .await_terminal(&handle, &cancel)
            .await
            .and_then(|status| BatchOutcome::from_status(&calls_id, status));

        let report = match result {
            Ok(outcome) => {
                info!("Batch {} confirmed in transaction {}", calls_id, outcome.transaction_hash);
                self.record_outcome(&calls_id, "CONFIRMED", Some(&outcome.transaction_hash), None).await;
                BatchReport::success(kind, record_id, outcome, handle.attributes)
            }
            Err(BatchError::Cancelled { .. }) => {
                self.record_outcome(&calls_id, "CANCELLED", None, None).await;
                return;
            }
            Err(BatchError::AlreadyPolling { .. }) => {
                warn!("Batch {} is already followed elsewhere", calls_id);
                return;
            }
            Err(e) => {
                warn!("Batch {} did not confirm: {}", calls_id, e);
                let status = match &e {
                    BatchError::Failed { status, .. } => status.to_string(),
                    BatchError::Timeout { .. } => "TIMEOUT".to_string(),
                    _ => "ERROR".to_string(),
                };
                self.record_outcome(&calls_id, &status, None, Some(&e.to_string())).await;
                BatchReport::failure(kind, record_id, Some(calls_id), &e)
            }
        };

        self.report(report).await;
    }

    async fn record_outcome(&self, calls_id: &str, status: &str, transaction_hash: Option<&str>, error: Option<&str>) {
        if let Err(e) = self.registry.record_outcome(calls_id, status, transaction_hash, error).await {
            error!("Failed to record outcome of batch {}: {}", calls_id, e);
        }
    }

    async fn report(&self, report: BatchReport) {
        let event = report.event_name();
        if let Err(e) = self.sink.report(report).await {
            error!("Failed to deliver {} to result sink: {}", event, e);
        }
    }
}
