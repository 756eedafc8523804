//! Appointments as delivered by the validated intake.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::identifier::TransactionIdentifier;

/// Opaque appointment identifier assigned by the intake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct AppointmentId(pub B256);

impl AppointmentId {
    /// Returns the raw 32 bytes of the identifier.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }
}

impl From<B256> for AppointmentId {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = format!("{:x}", self.0);
        write!(f, "apt:{}", &full[..16])
    }
}

/// Everything needed to build the response transaction for an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    /// Contract the response calls.
    pub contract_address: Address,
    /// Call data of the response.
    pub data: Bytes,
    /// Value to attach, in wei.
    pub value: U256,
    /// Gas limit to submit with.
    pub gas_limit: u64,
    /// Chain the response targets.
    pub chain_id: u64,
}

impl ResponseData {
    /// Derives the fingerprint this response will carry on chain.
    pub fn identifier(&self) -> TransactionIdentifier {
        TransactionIdentifier {
            chain_id: self.chain_id,
            data: self.data.clone(),
            to: self.contract_address,
            value: self.value,
            gas_limit: self.gas_limit,
        }
    }
}

/// A customer appointment, already validated by the intake.
///
/// The response core never inspects customer signatures or appointment
/// windows; by the time an appointment reaches it, responding is the only
/// remaining obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Intake-assigned identifier.
    pub id: AppointmentId,
    /// The transaction to submit.
    pub response_data: ResponseData,
}
