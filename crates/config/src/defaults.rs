//! Default values for responder configuration.

use alloy_primitives::U256;

/// Maximum outstanding responses per signer.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 12;

/// Minimum percentage increase for replacing a pending transaction at the
/// same nonce. Mainstream mempools require 10-15%.
pub const DEFAULT_REPLACEMENT_RATE_PERCENT: u64 = 13;

/// Blocks after mining before a response is considered final.
pub const DEFAULT_CONFIRMATIONS_REQUIRED: u64 = 40;

/// Depth of recent chain retained for reorg handling.
pub const DEFAULT_MAX_REORG_DEPTH: u64 = 200;

/// Blocks a trigger must be buried before the watcher hands an appointment
/// to the responder.
pub const DEFAULT_WATCHER_RESPONSE_CONFIRMATIONS: u64 = 5;

/// Signer balance alarm level: 0.5 ether in wei.
pub fn default_low_balance_threshold() -> U256 {
    U256::from(500_000_000_000_000_000u64)
}
