//! Core data types shared across the PISA response core.
//!
//! Everything here is plain data: blocks as observed on chain, the
//! transaction identifier used to match broadcasts against observations,
//! appointments as delivered by the validated intake, and the legacy
//! transaction payloads handed to a signer.

mod appointment;
mod block;
mod identifier;
mod transaction;

pub use appointment::{Appointment, AppointmentId, ResponseData};
pub use block::{Block, Transaction};
pub use identifier::TransactionIdentifier;
pub use transaction::{SignatureParts, TransactionFields};

// Re-export the primitives so downstream crates name a single source.
pub use alloy_primitives::{Address, Bytes, B256, U256};
