//! Batch Registry Module
//!
//! This module provides a database registry of submitted batches and their
//! outcomes, for auditing and for answering status queries after the
//! in-memory tracker has been restarted.

mod database;
pub use database::{BatchRecord, Registry};
