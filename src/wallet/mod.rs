//! Wallet Provider Module
//!
//! This module defines the seam to the wallet's batched-transaction API:
//! - `wallet_sendCalls`: submit an ordered batch of calls
//! - `wallet_getCallsStatus`: query the status of a submitted batch
//!
//! The provider is always passed in explicitly; there is no process-wide
//! wallet instance.

mod provider;
pub use provider::{WalletProvider, connect};
