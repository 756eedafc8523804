use alloy_primitives::U256;
use serde::Deserialize;

use crate::{
    defaults::{
        default_low_balance_threshold, DEFAULT_CONFIRMATIONS_REQUIRED, DEFAULT_MAX_QUEUE_DEPTH,
        DEFAULT_MAX_REORG_DEPTH, DEFAULT_REPLACEMENT_RATE_PERCENT,
        DEFAULT_WATCHER_RESPONSE_CONFIRMATIONS,
    },
    ConfigError,
};

/// Tunables of the response core.
///
/// One instance is shared by the block cache, the responder and the
/// state-machine components of a node.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponderConfig {
    /// Maximum outstanding responses per signer.
    max_queue_depth: usize,

    /// Minimum percentage increase for nonce replacement.
    replacement_rate_percent: u64,

    /// Blocks after mining before a response is discarded.
    confirmations_required: u64,

    /// Block cache depth.
    max_reorg_depth: u64,

    /// Signer balance alarm level, in wei.
    low_balance_threshold: U256,

    /// Trigger depth before the watcher starts a response.
    watcher_response_confirmations: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            replacement_rate_percent: DEFAULT_REPLACEMENT_RATE_PERCENT,
            confirmations_required: DEFAULT_CONFIRMATIONS_REQUIRED,
            max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
            low_balance_threshold: default_low_balance_threshold(),
            watcher_response_confirmations: DEFAULT_WATCHER_RESPONSE_CONFIRMATIONS,
        }
    }
}

impl ResponderConfig {
    /// Creates a config, falling back to defaults for unset knobs.
    pub fn new(
        max_queue_depth: Option<usize>,
        replacement_rate_percent: Option<u64>,
        confirmations_required: Option<u64>,
        max_reorg_depth: Option<u64>,
        low_balance_threshold: Option<U256>,
        watcher_response_confirmations: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_queue_depth: max_queue_depth.unwrap_or(DEFAULT_MAX_QUEUE_DEPTH),
            replacement_rate_percent: replacement_rate_percent
                .unwrap_or(DEFAULT_REPLACEMENT_RATE_PERCENT),
            confirmations_required: confirmations_required
                .unwrap_or(DEFAULT_CONFIRMATIONS_REQUIRED),
            max_reorg_depth: max_reorg_depth.unwrap_or(DEFAULT_MAX_REORG_DEPTH),
            low_balance_threshold: low_balance_threshold
                .unwrap_or_else(default_low_balance_threshold),
            watcher_response_confirmations: watcher_response_confirmations
                .unwrap_or(DEFAULT_WATCHER_RESPONSE_CONFIRMATIONS),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the bounds the rest of the system assumes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_depth < 1 {
            return Err(ConfigError::OutOfRange("max_queue_depth must be >= 1"));
        }
        if self.replacement_rate_percent < 1 {
            return Err(ConfigError::OutOfRange(
                "replacement_rate_percent must be >= 1",
            ));
        }
        if self.max_reorg_depth < 1 {
            return Err(ConfigError::OutOfRange("max_reorg_depth must be >= 1"));
        }
        Ok(())
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }

    pub fn replacement_rate_percent(&self) -> u64 {
        self.replacement_rate_percent
    }

    pub fn confirmations_required(&self) -> u64 {
        self.confirmations_required
    }

    pub fn max_reorg_depth(&self) -> u64 {
        self.max_reorg_depth
    }

    pub fn low_balance_threshold(&self) -> U256 {
        self.low_balance_threshold
    }

    pub fn watcher_response_confirmations(&self) -> u64 {
        self.watcher_response_confirmations
    }
}
