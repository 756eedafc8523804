//! Nonce-ordered priority queue for response transactions.
//!
//! The queue decides which response sits at which nonce at which gas
//! price. It is a pure value: operations never mutate, they return the
//! next queue, which makes persist-then-swap updates and crash recovery
//! straightforward for the responder that owns it.

mod error;
mod item;
mod queue;

pub use error::GasQueueError;
pub use item::{GasQueueItem, GasQueueItemRequest};
pub use queue::GasQueue;
