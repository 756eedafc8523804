use thiserror::Error;

use crate::action_store::ActionStoreError;

/// Errors raised while driving a component over block events.
#[derive(Debug, Error)]
pub enum StateMachineError {
    /// The action store failed; the current transition aborts and replays.
    #[error(transparent)]
    Store(#[from] ActionStoreError),

    /// An action could not be encoded for staging.
    #[error("action codec failure: {0}")]
    Codec(#[from] bincode::Error),
}
