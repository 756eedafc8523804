use thiserror::Error;

/// Argument errors raised by gas queue operations.
///
/// Anything here leaves the input queue untouched. Invariant breaches
/// produced by the queue's own arithmetic are not represented: those are
/// bugs and abort the process before a corrupt queue can be persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GasQueueError {
    /// The queue already holds `max_queue_depth` items.
    #[error("cannot add item, queue has reached max depth {0}")]
    DepthReached(usize),

    /// The identifier is not present in the queue.
    #[error("identifier not present in queue: {0}")]
    UnknownIdentifier(String),

    /// The identifier is already present in the queue.
    #[error("identifier already present in queue: {0}")]
    DuplicateIdentifier(String),

    /// Dequeue was called on an empty queue.
    #[error("cannot dequeue from an empty queue")]
    Empty,

    /// Prepended items do not sit strictly below the existing queue, or
    /// collide with each other.
    #[error("prepended nonces overlap or duplicate existing items")]
    OverlappingNonces,

    /// A queue reconstructed from external data violates an invariant.
    #[error("invalid queue: {0}")]
    Invalid(&'static str),
}
