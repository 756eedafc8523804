//! Anchor states and the shared record of live responses.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use pisa_gas_queue::GasQueueItem;
use pisa_primitives::{AppointmentId, TransactionIdentifier};

/// Per-appointment anchor state, derived purely from the chain.
///
/// The transition is monotone per branch: once `Mined`, an appointment
/// stays `Mined` on that branch. A reorg that discards the mining block
/// surfaces as a head whose state was re-derived without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentAnchorState {
    /// The response has not been observed in this head's ancestry.
    Pending {
        /// Fingerprint the response carries.
        identifier: TransactionIdentifier,
    },
    /// The response was observed mined in this head's ancestry.
    Mined {
        /// Fingerprint the response carries.
        identifier: TransactionIdentifier,
        /// Height of the block containing the response.
        block_mined: u64,
        /// Nonce the response mined at.
        nonce: u64,
    },
}

impl AppointmentAnchorState {
    /// Whether this state is `Pending`.
    pub fn is_pending(&self) -> bool {
        matches!(self, AppointmentAnchorState::Pending { .. })
    }
}

/// The responder component's anchor state at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderAnchorState {
    /// Height of the anchoring block.
    pub block_number: u64,
    /// State of every tracked appointment at that block.
    pub items: BTreeMap<AppointmentId, AppointmentAnchorState>,
}

impl ResponderAnchorState {
    /// The empty anchor: nothing tracked, height zero.
    pub fn empty() -> Self {
        Self {
            block_number: 0,
            items: BTreeMap::new(),
        }
    }
}

/// Live responses a responder is committed to, shared between the
/// responder (writer, under its operation lock) and the state-machine
/// reducer (reader).
///
/// An appointment stays recorded from `start_response` until
/// `end_response`, surviving the queue removal that mining causes — that
/// gap is exactly what lets a reorg re-enqueue an evicted response at its
/// recorded nonce.
#[derive(Debug, Clone, Default)]
pub struct TrackedResponses {
    inner: Arc<RwLock<BTreeMap<AppointmentId, GasQueueItem>>>,
}

impl TrackedResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the records, e.g. from a store load.
    pub fn seed(&self, records: BTreeMap<AppointmentId, GasQueueItem>) {
        *self.inner.write() = records;
    }

    pub fn insert(&self, id: AppointmentId, item: GasQueueItem) {
        self.inner.write().insert(id, item);
    }

    pub fn remove(&self, id: &AppointmentId) {
        self.inner.write().remove(id);
    }

    pub fn get(&self, id: &AppointmentId) -> Option<GasQueueItem> {
        self.inner.read().get(id).cloned()
    }

    pub fn contains(&self, id: &AppointmentId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Snapshot of every live record.
    pub fn snapshot(&self) -> BTreeMap<AppointmentId, GasQueueItem> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
