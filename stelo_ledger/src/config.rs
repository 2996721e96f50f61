//! Ledger engine configuration.

use std::env;

use crate::db::config::parse_env_or;

/// Name of the base currency ledger unless overridden
pub const DEFAULT_BASE_LEDGER_NAME: &str = "stelo";

/// Default buffer size of the broadcast notifier
pub const DEFAULT_NOTIFY_CHANNEL_CAPACITY: usize = 1024;

/// Ledger engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Ledger collateral is held in, resolved by name at call time
    pub base_ledger_name: String,

    /// Capacity of the in-process notification channel
    pub notify_channel_capacity: usize,
}

impl LedgerConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `BASE_LEDGER_NAME`: base currency ledger (default: stelo)
    /// - `NOTIFY_CHANNEL_CAPACITY`: broadcast buffer size (default: 1024)
    pub fn from_env() -> Self {
        Self {
            base_ledger_name: env::var("BASE_LEDGER_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_LEDGER_NAME.to_string()),
            notify_channel_capacity: parse_env_or(
                "NOTIFY_CHANNEL_CAPACITY",
                DEFAULT_NOTIFY_CHANNEL_CAPACITY,
            ),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_ledger_name: DEFAULT_BASE_LEDGER_NAME.to_string(),
            notify_channel_capacity: DEFAULT_NOTIFY_CHANNEL_CAPACITY,
        }
    }
}
