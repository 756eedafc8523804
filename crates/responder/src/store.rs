//! Persistence seam for responder state.

use std::collections::BTreeMap;

use pisa_gas_queue::{GasQueue, GasQueueItem};
use pisa_primitives::{Address, AppointmentId};
use thiserror::Error;

/// Errors raised by a responder store backend.
#[derive(Debug, Error)]
pub enum ResponderStoreError {
    /// The backing store failed; the surrounding operation aborts.
    #[error("responder store failure: {0}")]
    Storage(String),

    /// Persisted data could not be decoded back into a valid queue.
    #[error("corrupt responder state: {0}")]
    Corrupt(String),
}

/// Responder state as reloaded on startup.
#[derive(Debug, Clone)]
pub struct StoredResponderState {
    /// The queue as last persisted.
    pub queue: GasQueue,
    /// Per-appointment records, including mined-but-not-yet-final
    /// responses that are no longer queued.
    pub responses: BTreeMap<AppointmentId, GasQueueItem>,
}

/// Durable record of a responder's queue and per-appointment items.
///
/// `update_queue` must be atomic: the serialised queue and every changed
/// item land in one batch, or none of them do. Recovery replays the last
/// such batch, so a crash between persist and broadcast only ever loses
/// broadcasts, which re-fire on the next queue change.
pub trait ResponderStore: Send + Sync + 'static {
    /// Loads the persisted state for a signer, if any.
    fn load(&self, address: Address) -> Result<Option<StoredResponderState>, ResponderStoreError>;

    /// Atomically persists the queue plus the records that changed with it.
    fn update_queue(
        &self,
        address: Address,
        queue: &GasQueue,
        changed: &[GasQueueItem],
    ) -> Result<(), ResponderStoreError>;

    /// Forgets one appointment's record.
    fn remove_response(
        &self,
        address: Address,
        appointment_id: AppointmentId,
    ) -> Result<(), ResponderStoreError>;
}
