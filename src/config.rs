//! Configuration Module
//!
//! This module defines all configuration structures for the relay.
//! Configuration is loaded from TOML files and parsed using serde.

use ethers::types::Address;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::time::Duration;

/// Main configuration structure
///
/// Contains all configuration sections for the relay.
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [wallet]
/// rpc_url = "http://127.0.0.1:8546"
/// chain_id = 84532
/// payment_token = "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
/// paymaster_url = "https://paymaster.example/rpc"
///
/// [polling]
/// interval_ms = 2000
/// max_attempts = 150
///
/// [api]
/// host = "127.0.0.1"
/// port = 4010
///
/// [sink]
/// url = "http://127.0.0.1:4000/hooks/wallet"
///
/// [database]
/// url = "sqlite://batches.db?mode=rwc"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub wallet: WalletConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    pub api: ApiConfig,
    pub sink: SinkConfig,
    pub database: DatabaseConfig,
}

/// Wallet provider configuration
///
/// # Fields
/// - `rpc_url`: JSON-RPC endpoint exposing `wallet_sendCalls` / `wallet_getCallsStatus`
/// - `chain_id`: Chain the batches are executed on (84532 = Base Sepolia)
/// - `payment_token`: ERC-20 token bookings are paid in
/// - `paymaster_url`: Gas sponsorship service; batches are unsponsored when absent
///
/// The paymaster URL carries an API key, so `Debug` prints only its origin.
#[derive(Clone, Deserialize)]
pub struct WalletConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub payment_token: Address,
    #[serde(default)]
    pub paymaster_url: Option<String>,
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("payment_token", &self.payment_token)
            .field("paymaster_url", &self.paymaster_url.as_deref().map(redact_url))
            .finish()
    }
}

/// Keep the scheme and host of `url`, drop path and query
fn redact_url(url: &str) -> String {
    let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    if scheme.is_empty() {
        format!("{host}/<redacted>")
    } else {
        format!("{scheme}://{host}/<redacted>")
    }
}

/// Status polling configuration
///
/// Every poll loop is bounded: it stops after `max_attempts` status queries
/// or after `max_poll_errors` consecutive failed queries.
///
/// # Fields
/// - `interval_ms`: Delay between two status queries
/// - `max_attempts`: Status queries before a still-pending batch is given up
/// - `max_poll_errors`: Consecutive failed queries before polling gives up
/// - `max_backoff_ms`: Upper bound of the backoff after a failed query
/// - `retained_batches`: Settled batches kept in memory; older ones are read from the registry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub max_poll_errors: u32,
    pub max_backoff_ms: u64,
    pub retained_batches: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: 150,
            max_poll_errors: 5,
            max_backoff_ms: 30_000,
            retained_batches: 1024,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Delay before retrying after the `errors`-th consecutive failed query
    ///
    /// Starts at the poll interval and doubles, capped at `max_backoff_ms`.
    pub fn backoff(&self, errors: u32) -> Duration {
        let factor = 1u64 << errors.saturating_sub(1).min(16);
        Duration::from_millis(self.interval_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

/// API server configuration
///
/// Controls the JSON-RPC endpoint the view process pushes hook events to.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Result sink configuration
///
/// # Fields
/// - `url`: Endpoint of the view process receiving batch outcomes
/// - `timeout_ms`: Per-request timeout
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub url: String,
    #[serde(default = "default_sink_timeout")]
    pub timeout_ms: u64,
}

fn default_sink_timeout() -> u64 {
    10_000
}

/// Database configuration
///
/// Settings for the batch registry database.
///
/// # Fields
/// - `url`: Database connection URL (e.g., "sqlite://batches.db?mode=rwc")
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
