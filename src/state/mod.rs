//! Batch State Module
//!
//! This module tracks the lifecycle of submitted batches in memory:
//! which ones are still being polled (and how to cancel them) and which
//! already reached a terminal status.

mod tracker;
pub use tracker::{BatchState, BatchTracker, Claim, DEFAULT_RETAINED_BATCHES, TrackedBatch};
