//! This crate relays booking payments to an on-chain wallet.
//! Hook events pushed by the booking application become ordered call batches
//! that are submitted atomically through `wallet_sendCalls`, followed with
//! `wallet_getCallsStatus` until they settle, and reported back to the
//! application.

pub mod types; // Batch requests, wallet responses, hook events.
pub mod error; // Error types per layer.
pub mod config; // Loads relay configuration.
pub mod contracts; // ABI bindings for encoded calls.
pub mod wallet; // Seam to the wallet's batched-transaction API.
pub mod batch; // Call assembly, submission, polling and orchestration.
pub mod sink; // Delivers batch outcomes to the booking application.
pub mod state; // In-memory lifecycle of submitted batches.
pub mod registry; // Persistent record of batches.
pub mod api; // JSON-RPC endpoint receiving hook events.
pub mod test_utils; // Test doubles for the wallet and the sink.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use batch::{BatchOrchestrator, TransactionBatchSubmitter};
