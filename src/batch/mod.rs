//! Batch Module
//!
//! This module handles call batches from hook event to terminal outcome:
//! - CallBuilder: Builds the ordered calls of a batch for each hook flow
//! - TransactionBatchSubmitter: Submits batches and polls their status
//! - BatchOrchestrator: Runs the whole pipeline and reports outcomes

mod builder;
mod submitter;
pub mod orchestrator;

#[cfg(test)]
mod tests;

pub use builder::{BOOKING_DATA_REQUESTS, CallBuilder, PreparedBatch};
pub use orchestrator::BatchOrchestrator;
pub use submitter::{BatchOutcome, TransactionBatchSubmitter};
