//! The PISA multi-responder and its state-machine components.
//!
//! The responder owns one signing key, the gas queue assigning its nonces,
//! and the persistent record of every live response. The responder
//! component feeds it chain observations through the block state machine;
//! the watcher component hands it appointments whose triggers fired.

mod component;
mod error;
mod estimator;
mod records;
mod responder;
mod signer;
mod store;
mod watcher;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use component::{ResponderAction, ResponderComponent};
pub use error::ResponderError;
pub use estimator::{ChainGasEstimator, GasEstimator};
pub use records::{AppointmentAnchorState, ResponderAnchorState, TrackedResponses};
pub use responder::{BalanceAlert, MultiResponder};
pub use signer::{LocalSigner, Signer, SignerError};
pub use store::{ResponderStore, ResponderStoreError, StoredResponderState};
pub use watcher::{
    ArmedAppointment, TriggerAnchorState, WatcherAction, WatcherAnchorState, WatcherComponent,
};
