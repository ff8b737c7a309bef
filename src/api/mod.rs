//! API Module
//!
//! This module handles the JSON-RPC API the booking application pushes hook
//! events to, plus status and cancel queries for submitted batches.

mod server;
pub use server::{AppState, Server, router};
