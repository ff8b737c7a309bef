//! Transaction Batch Submitter Module
//!
//! Submits an ordered list of calls as one batch through `wallet_sendCalls`
//! and polls `wallet_getCallsStatus` until the batch reaches a terminal
//! status.
//!
//! # Poll Loop
//! 1. Query the status immediately after being asked to wait
//! 2. `PENDING`: sleep one interval and query again
//! 3. `CONFIRMED`: stop and return the status (receipts included)
//! 4. Anything else: stop and report the batch as failed
//!
//! Every loop is bounded by a maximum number of pending answers and by a
//! cancellation token. Failed status queries are retried with exponential
//! backoff until too many fail in a row.

use crate::{
    BatchHandle, BatchRequest, CallDescriptor, CallsStatus, Capabilities, SEND_CALLS_VERSION,
    config::PollingConfig,
    error::BatchError,
    state::{BatchTracker, Claim},
    wallet::WalletProvider,
};
use ethers::types::{Address, U64};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a confirmed batch produced
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub calls_id: String,
    /// Hash of the first receipt's transaction
    pub transaction_hash: String,
    /// Logs of the first receipt, as the wallet reported them
    pub logs: Vec<serde_json::Value>,
}

impl BatchOutcome {
    /// Extract the outcome of a confirmed batch
    pub fn from_status(calls_id: &str, status: CallsStatus) -> Result<Self, BatchError> {
        let receipt = status
            .receipts
            .into_iter()
            .next()
            .ok_or_else(|| BatchError::MissingReceipt { calls_id: calls_id.to_string() })?;

        Ok(Self {
            calls_id: calls_id.to_string(),
            transaction_hash: receipt.transaction_hash,
            logs: receipt.logs,
        })
    }
}

/// Submits call batches and waits for their terminal status
pub struct TransactionBatchSubmitter {
    provider: Arc<dyn WalletProvider>,
    polling: PollingConfig,
    tracker: BatchTracker,
}

impl TransactionBatchSubmitter {
    /// Creates a new submitter
    ///
    /// # Arguments
    /// * `provider` - Wallet the batches are submitted to
    /// * `polling` - Poll interval and bounds
    /// * `tracker` - Shared lifecycle table, updated when polling ends
    pub fn new(provider: Arc<dyn WalletProvider>, polling: PollingConfig, tracker: BatchTracker) -> Self {
        Self { provider, polling, tracker }
    }

    pub fn tracker(&self) -> &BatchTracker {
        &self.tracker
    }

    /// Submit `calls` as one batch
    ///
    /// Call order is preserved exactly. A rejected submission is returned to
    /// the caller and never retried; resubmitting takes a fresh call.
    ///
    /// # Arguments
    /// * `calls` - Ordered calls, must not be empty
    /// * `from` - Wallet address that signs the batch
    /// * `chain_id` - Chain the batch executes on
    /// * `capabilities` - Paymaster and data callback requests
    /// * `atomic_required` - Whether the wallet must execute all calls or none
    pub async fn submit(
        &self,
        calls: Vec<CallDescriptor>,
        from: Address,
        chain_id: U64,
        capabilities: Capabilities,
        atomic_required: bool,
    ) -> Result<BatchHandle, BatchError> {
        if calls.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let request = BatchRequest {
            version: SEND_CALLS_VERSION.to_string(),
            chain_id,
            from,
            calls,
            atomic_required,
            capabilities,
        };

        let response = self.provider.send_calls(&request).await.map_err(BatchError::Submission)?;
        let handle = BatchHandle::from(response);
        info!("Batch {} submitted from {:?} with {} calls", handle.calls_id, from, request.calls.len());

        Ok(handle)
    }

    /// Wait until the batch behind `handle` reaches a terminal status
    ///
    /// Returns the status on `CONFIRMED`. If a terminal status was already
    /// observed for this handle it is returned without querying the wallet.
    /// Only one poll loop runs per handle at a time.
    ///
    /// # Errors
    /// * `AlreadyPolling` - another caller is polling this handle
    /// * `Failed` - the wallet reported any status other than pending/confirmed
    /// * `Timeout` - still pending after `max_attempts` queries
    /// * `Poll` - `max_poll_errors` status queries failed in a row
    /// * `Cancelled` - `cancel` fired
    pub async fn await_terminal(
        &self,
        handle: &BatchHandle,
        cancel: &CancellationToken,
    ) -> Result<CallsStatus, BatchError> {
        let calls_id = handle.calls_id.as_str();

        match self.tracker.claim(calls_id, cancel).await {
            Claim::Claimed => {}
            Claim::Busy => return Err(BatchError::AlreadyPolling { calls_id: calls_id.to_string() }),
            Claim::Terminal(status) => {
                debug!("Batch {} already terminal with {}", calls_id, status.status);
                return confirmed_or_failed(calls_id, status);
            }
        }

        let result = self.poll(calls_id, cancel).await;
        match &result {
            Ok(status) => self.tracker.finish(calls_id, status.clone()).await,
            Err(BatchError::Failed { status, .. }) => {
                let status = CallsStatus { status: status.clone(), receipts: vec![] };
                self.tracker.finish(calls_id, status).await
            }
            Err(e) => self.tracker.abandon(calls_id, e.to_string()).await,
        }
        result
    }

    async fn poll(&self, calls_id: &str, cancel: &CancellationToken) -> Result<CallsStatus, BatchError> {
        let mut pending = 0u32;
        let mut errors = 0u32;

        loop {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BatchError::Cancelled { calls_id: calls_id.to_string() }),
                response = self.provider.get_calls_status(calls_id) => response,
            };

            let delay = match response {
                Ok(status) if status.status.is_pending() => {
                    errors = 0;
                    pending += 1;
                    debug!("Batch {} still pending ({}/{})", calls_id, pending, self.polling.max_attempts);
                    if pending >= self.polling.max_attempts {
                        warn!("Batch {} still pending after {} queries, giving up", calls_id, pending);
                        return Err(BatchError::Timeout { calls_id: calls_id.to_string(), attempts: pending });
                    }
                    self.polling.interval()
                }
                Ok(status) => {
                    info!("Batch {} reached terminal status {}", calls_id, status.status);
                    return confirmed_or_failed(calls_id, status);
                }
                Err(source) => {
                    errors += 1;
                    warn!("Status query for batch {} failed ({}/{}): {}", calls_id, errors, self.polling.max_poll_errors, source);
                    if errors >= self.polling.max_poll_errors {
                        return Err(BatchError::Poll { calls_id: calls_id.to_string(), attempts: errors, source });
                    }
                    self.polling.backoff(errors)
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BatchError::Cancelled { calls_id: calls_id.to_string() }),
                _ = sleep(delay) => {}
            }
        }
    }
}

fn confirmed_or_failed(calls_id: &str, status: CallsStatus) -> Result<CallsStatus, BatchError> {
    if status.status.is_confirmed() {
        Ok(status)
    } else {
        Err(BatchError::Failed { calls_id: calls_id.to_string(), status: status.status })
    }
}
