//! Durable staging area for actions between detection and execution.

use thiserror::Error;

/// Identifier of a staged action, monotone per store.
pub type ActionId = u64;

/// Errors raised by an action store backend.
#[derive(Debug, Error)]
pub enum ActionStoreError {
    /// The backing store failed; the current head transition aborts and
    /// replays later.
    #[error("action store failure: {0}")]
    Storage(String),
}

/// Persistence for actions awaiting execution.
///
/// An action is appended *before* its effector runs and removed only after
/// the effector returns, so a crash in between leaves it pending and it
/// replays on the next head. Payloads are opaque bytes; the driver owns
/// the codec.
pub trait ActionStore: Send + Sync + 'static {
    /// Stages an action for a component, returning its id.
    fn append(&self, component: &str, payload: &[u8]) -> Result<ActionId, ActionStoreError>;

    /// Discards an executed action.
    fn remove(&self, component: &str, id: ActionId) -> Result<(), ActionStoreError>;

    /// Staged actions for a component, oldest first.
    fn pending(&self, component: &str) -> Result<Vec<(ActionId, Vec<u8>)>, ActionStoreError>;
}
