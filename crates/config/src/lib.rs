//! Configuration for the PISA response core.

mod config;
pub mod defaults;

pub use config::ResponderConfig;

use thiserror::Error;

/// Errors raised while constructing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A knob was set outside the range the core supports.
    #[error("configuration out of range: {0}")]
    OutOfRange(&'static str),
}
