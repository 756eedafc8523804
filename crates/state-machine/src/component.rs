//! The component seam: a reducer over blocks plus an effector over head
//! changes.

use std::fmt::Debug;

use async_trait::async_trait;
use pisa_primitives::Block;
use serde::{de::DeserializeOwned, Serialize};

/// A state-machine component.
///
/// A component lifts a per-block *anchor state* out of the chain with a
/// pure reducer, and reacts to head changes by diffing the old and new
/// head's states into actions. States are indexed by block hash and are
/// never mutated in place, which is what makes reorgs free: the state for
/// a block on a losing branch simply stops being consulted.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Per-block anchor state.
    type State: Clone + Debug + Send + Sync + 'static;
    /// Action derived from a head change. Serialised into the action store
    /// before execution, so replays after a crash see the same value.
    type Action: Clone + Debug + Serialize + DeserializeOwned + Send + 'static;

    /// Stable name keying this component's persisted actions.
    fn name(&self) -> &'static str;

    /// Anchor state for a block with no known predecessor state.
    fn initial_state(&self, block: &Block) -> Self::State;

    /// Pure transition: the anchor state of `block` given its parent's.
    fn reduce(&self, prev: &Self::State, block: &Block) -> Self::State;

    /// Anchor state assumed for a head whose state is unknown — the
    /// synthetic startup head, or a head older than retained history.
    /// Diffing against it must regenerate every outstanding action.
    fn base_state(&self) -> Self::State;

    /// Actions needed to move the world from `prev`'s view to `next`'s.
    fn detect_changes(&self, prev: &Self::State, next: &Self::State) -> Vec<Self::Action>;

    /// Executes one action. Must be idempotent: a crash between persisting
    /// and removing an action replays it.
    async fn apply_action(&self, action: Self::Action) -> eyre::Result<()>;
}
