use std::time::Duration;

use clap::Args;
use log::LevelFilter;
use trustrefund_common::config::DEFAULT_CONTRACT_ADDRESS;

// Default wait for a submitted transaction to settle
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 60;
// Receipt poll interval while awaiting confirmation
pub const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(200);
// Delay before re-subscribing to the provider's account-change channel
pub const ACCOUNT_RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(1);
// Capacity of the event channels exposed to the presentation layer
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Args)]
pub struct NetworkConfig {
    /// Ticket contract address to target
    #[clap(long, default_value_t = String::from(DEFAULT_CONTRACT_ADDRESS))]
    pub contract_address: String,
    /// Confirmation timeout in seconds
    #[clap(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    pub confirmation_timeout: u64,
}

#[derive(Debug, Clone, Args)]
pub struct LogConfig {
    /// Set log level
    #[clap(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}
