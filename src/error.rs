//! Error Types
//!
//! One error enum per layer. Nothing here is fatal to the host process: the
//! orchestrator turns every batch error into a failure report for the sink.

use crate::BatchStatus;
use ethers::providers::ProviderError;
use thiserror::Error;

/// Failure talking to the wallet provider
#[derive(Debug, Error)]
pub enum WalletError {
    /// Transport failure, JSON-RPC error or user rejection
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The wallet answered, but not in a shape we understand
    #[error("malformed wallet response: {0}")]
    Malformed(String),
}

/// Failure of a batch between submission and terminal status
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch contains no calls")]
    EmptyBatch,

    /// The initial `wallet_sendCalls` was rejected. Never retried.
    #[error("batch submission rejected: {0}")]
    Submission(#[source] WalletError),

    /// Status queries kept failing after backing off
    #[error("status query for batch {calls_id} failed {attempts} times in a row: {source}")]
    Poll {
        calls_id: String,
        attempts: u32,
        #[source]
        source: WalletError,
    },

    #[error("batch {calls_id} failed with status {status}")]
    Failed { calls_id: String, status: BatchStatus },

    #[error("batch {calls_id} still pending after {attempts} status queries")]
    Timeout { calls_id: String, attempts: u32 },

    #[error("polling for batch {calls_id} was cancelled")]
    Cancelled { calls_id: String },

    #[error("batch {calls_id} is already being polled")]
    AlreadyPolling { calls_id: String },

    #[error("batch {calls_id} was confirmed without a receipt")]
    MissingReceipt { calls_id: String },
}

/// Failure delivering a report to the result sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("result sink request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("result sink answered with status {0}")]
    Status(reqwest::StatusCode),
}

/// Failure persisting batch records
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry database error: {0}")]
    Database(#[from] sqlx::Error),
}
