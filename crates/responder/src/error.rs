use pisa_chain::ChainClientError;
use pisa_gas_queue::GasQueueError;
use pisa_primitives::AppointmentId;
use thiserror::Error;

use crate::{signer::SignerError, store::ResponderStoreError};

/// Errors surfaced by responder operations.
///
/// Chain failures never appear here: broadcast and estimation problems are
/// logged and swallowed so that a flaky node cannot corrupt queue state.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// A queue operation rejected its arguments, e.g. the depth limit.
    #[error(transparent)]
    Queue(#[from] GasQueueError),

    /// The persistent store failed; the operation did not take effect.
    #[error(transparent)]
    Store(#[from] ResponderStoreError),

    /// A chain read required for correctness (not broadcasting) failed.
    #[error(transparent)]
    Chain(#[from] ChainClientError),

    /// Signing failed; the key material is unusable.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// The appointment is not tracked by this responder.
    #[error("unknown appointment: {0}")]
    UnknownAppointment(AppointmentId),
}
