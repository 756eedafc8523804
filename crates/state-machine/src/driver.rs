//! Per-component driver: holds anchor states and runs the effector.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::B256;
use async_trait::async_trait;
use parking_lot::RwLock;
use pisa_chain::{BlockCache, BlockEvent};
use pisa_primitives::Block;
use tracing::{debug, error, warn};

use crate::{
    action_store::ActionStore,
    component::Component,
    error::StateMachineError,
};

/// Object-safe facade the event pump drives.
#[async_trait]
pub trait BlockEventListener: Send {
    /// Processes one chain event. Must complete before the pump hands the
    /// next event to any listener.
    async fn process_event(&mut self, event: &BlockEvent) -> Result<(), StateMachineError>;
}

/// Drives one [`Component`] over the block event stream.
///
/// Keeps the component's anchor state per block hash, reducing on every
/// `NewBlock`, diffing and executing actions on every `NewHead`, and
/// dropping states together with pruned blocks.
pub struct ComponentDriver<C: Component, A> {
    component: Arc<C>,
    cache: Arc<RwLock<BlockCache>>,
    action_store: Arc<A>,
    states: HashMap<B256, C::State>,
}

impl<C: Component, A> std::fmt::Debug for ComponentDriver<C, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDriver")
            .field("component", &self.component.name())
            .field("states", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl<C: Component, A: ActionStore> ComponentDriver<C, A> {
    /// Creates a driver with no anchor states yet.
    pub fn new(component: Arc<C>, cache: Arc<RwLock<BlockCache>>, action_store: Arc<A>) -> Self {
        Self {
            component,
            cache,
            action_store,
            states: HashMap::new(),
        }
    }

    /// Derives the anchor state of a freshly observed block.
    ///
    /// Prefers reducing from the parent's state; falls back to an initial
    /// state seeded from the cached parent, or from the block itself when
    /// the parent is outside retained history.
    fn derive_state(&self, block: &Block) -> C::State {
        if let Some(prev) = self.states.get(&block.parent_hash) {
            return self.component.reduce(prev, block);
        }

        let parent = {
            let cache = self.cache.read();
            cache
                .has_block(&block.parent_hash, true)
                .then(|| cache.get_block(&block.parent_hash).clone())
        };
        match parent {
            Some(parent_block) => {
                let seeded = self.component.initial_state(&parent_block);
                self.component.reduce(&seeded, block)
            }
            None => self.component.initial_state(block),
        }
    }

    fn on_new_block(&mut self, block: &Block) {
        let state = self.derive_state(block);
        self.states.insert(block.hash, state);
    }

    async fn on_new_head(&mut self, prev: Option<B256>, new: B256) -> Result<(), StateMachineError> {
        // Older staged actions run before anything this head produces.
        self.replay_pending().await?;

        let next = match self.states.get(&new) {
            Some(state) => state.clone(),
            None => {
                let block = self.cache.read().get_block(&new).clone();
                let state = self.derive_state(&block);
                self.states.insert(new, state.clone());
                state
            }
        };
        let prev_state = prev
            .and_then(|hash| self.states.get(&hash).cloned())
            .unwrap_or_else(|| self.component.base_state());

        let actions = self.component.detect_changes(&prev_state, &next);
        debug!(
            component = self.component.name(),
            count = actions.len(),
            "derived actions for head change"
        );

        for action in actions {
            let payload = bincode::serialize(&action)?;
            let id = self.action_store.append(self.component.name(), &payload)?;
            match self.component.apply_action(action.clone()).await {
                Ok(()) => self.action_store.remove(self.component.name(), id)?,
                Err(err) => {
                    warn!(
                        component = self.component.name(),
                        %err,
                        ?action,
                        "action failed, staged for replay"
                    );
                }
            }
        }

        Ok(())
    }

    /// Re-runs actions staged by an earlier head transition that never
    /// completed. Safe because actions are idempotent.
    async fn replay_pending(&self) -> Result<(), StateMachineError> {
        let pending = self.action_store.pending(self.component.name())?;
        for (id, payload) in pending {
            let action: C::Action = match bincode::deserialize(&payload) {
                Ok(action) => action,
                Err(err) => {
                    // An undecodable action can never execute; dropping it
                    // beats wedging the component forever.
                    error!(
                        component = self.component.name(),
                        %err,
                        id,
                        "discarding undecodable staged action"
                    );
                    self.action_store.remove(self.component.name(), id)?;
                    continue;
                }
            };
            match self.component.apply_action(action).await {
                Ok(()) => self.action_store.remove(self.component.name(), id)?,
                Err(err) => {
                    warn!(
                        component = self.component.name(),
                        %err,
                        id,
                        "staged action failed again, kept for replay"
                    );
                }
            }
        }
        Ok(())
    }

    fn on_pruned(&mut self, hashes: &[B256]) {
        for hash in hashes {
            self.states.remove(hash);
        }
    }

    /// Anchor state currently held for a block, if any.
    pub fn state(&self, hash: &B256) -> Option<&C::State> {
        self.states.get(hash)
    }
}

#[async_trait]
impl<C: Component, A: ActionStore> BlockEventListener for ComponentDriver<C, A> {
    async fn process_event(&mut self, event: &BlockEvent) -> Result<(), StateMachineError> {
        match event {
            BlockEvent::NewBlock(block) => {
                self.on_new_block(block);
                Ok(())
            }
            BlockEvent::NewHead { prev, new } => self.on_new_head(*prev, *new).await,
            BlockEvent::Pruned(hashes) => {
                self.on_pruned(hashes);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pisa_chain::test_utils::make_block;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::test_utils::MemoryActionStore;

    /// Counts blocks along each branch; actions report the count delta.
    struct CountingComponent {
        fail_applies: parking_lot::Mutex<bool>,
        applied: parking_lot::Mutex<Vec<CountAction>>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct CountAction {
        from: u64,
        to: u64,
    }

    impl CountingComponent {
        fn new() -> Self {
            Self {
                fail_applies: parking_lot::Mutex::new(false),
                applied: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Component for CountingComponent {
        type State = u64;
        type Action = CountAction;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn initial_state(&self, _block: &Block) -> u64 {
            1
        }

        fn reduce(&self, prev: &u64, _block: &Block) -> u64 {
            prev + 1
        }

        fn base_state(&self) -> u64 {
            0
        }

        fn detect_changes(&self, prev: &u64, next: &u64) -> Vec<CountAction> {
            if prev == next {
                vec![]
            } else {
                vec![CountAction {
                    from: *prev,
                    to: *next,
                }]
            }
        }

        async fn apply_action(&self, action: CountAction) -> eyre::Result<()> {
            if *self.fail_applies.lock() {
                eyre::bail!("effector offline");
            }
            self.applied.lock().push(action);
            Ok(())
        }
    }

    struct Fixture {
        component: Arc<CountingComponent>,
        store: Arc<MemoryActionStore>,
        cache: Arc<RwLock<BlockCache>>,
        driver: ComponentDriver<CountingComponent, MemoryActionStore>,
    }

    fn make_fixture() -> Fixture {
        let component = Arc::new(CountingComponent::new());
        let store = Arc::new(MemoryActionStore::default());
        let cache = Arc::new(RwLock::new(BlockCache::new(10)));
        let driver = ComponentDriver::new(component.clone(), cache.clone(), store.clone());
        Fixture {
            component,
            store,
            cache,
            driver,
        }
    }

    /// Adds a block to the cache and feeds it to the driver.
    async fn feed_block(fixture: &mut Fixture, block: Block) {
        fixture.cache.write().add_block(block.clone()).unwrap();
        fixture
            .driver
            .process_event(&BlockEvent::NewBlock(block))
            .await
            .unwrap();
    }

    fn hash(id: u8) -> B256 {
        B256::repeat_byte(id)
    }

    #[tokio::test]
    async fn test_reduces_along_parent_chain() {
        let mut fixture = make_fixture();

        feed_block(&mut fixture, make_block(100, 1, 0, vec![])).await;
        feed_block(&mut fixture, make_block(101, 2, 1, vec![])).await;
        feed_block(&mut fixture, make_block(102, 3, 2, vec![])).await;

        assert_eq!(fixture.driver.state(&hash(1)), Some(&1));
        assert_eq!(fixture.driver.state(&hash(2)), Some(&2));
        assert_eq!(fixture.driver.state(&hash(3)), Some(&3));
    }

    #[tokio::test]
    async fn test_seeds_from_cached_parent_without_state() {
        let mut fixture = make_fixture();

        // Parent lives in the cache but the driver never saw its event.
        fixture
            .cache
            .write()
            .add_block(make_block(100, 1, 0, vec![]))
            .unwrap();

        let child = make_block(101, 2, 1, vec![]);
        fixture.cache.write().add_block(child.clone()).unwrap();
        fixture
            .driver
            .process_event(&BlockEvent::NewBlock(child))
            .await
            .unwrap();

        // initial_state(parent) then reduce over the child.
        assert_eq!(fixture.driver.state(&hash(2)), Some(&2));
    }

    #[tokio::test]
    async fn test_head_change_applies_and_clears_actions() {
        let mut fixture = make_fixture();
        feed_block(&mut fixture, make_block(100, 1, 0, vec![])).await;
        feed_block(&mut fixture, make_block(101, 2, 1, vec![])).await;

        fixture
            .driver
            .process_event(&BlockEvent::NewHead {
                prev: None,
                new: hash(2),
            })
            .await
            .unwrap();

        let applied = fixture.component.applied.lock().clone();
        assert_eq!(applied, vec![CountAction { from: 0, to: 2 }]);
        assert!(fixture.store.pending("counting").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_action_stays_staged_and_replays() {
        let mut fixture = make_fixture();
        feed_block(&mut fixture, make_block(100, 1, 0, vec![])).await;
        feed_block(&mut fixture, make_block(101, 2, 1, vec![])).await;

        *fixture.component.fail_applies.lock() = true;
        fixture
            .driver
            .process_event(&BlockEvent::NewHead {
                prev: None,
                new: hash(2),
            })
            .await
            .unwrap();

        assert!(fixture.component.applied.lock().is_empty());
        assert_eq!(fixture.store.pending("counting").unwrap().len(), 1);

        // Effector comes back; the next head replays the staged action.
        *fixture.component.fail_applies.lock() = false;
        feed_block(&mut fixture, make_block(102, 3, 2, vec![])).await;
        fixture
            .driver
            .process_event(&BlockEvent::NewHead {
                prev: Some(hash(2)),
                new: hash(3),
            })
            .await
            .unwrap();

        let applied = fixture.component.applied.lock().clone();
        assert_eq!(
            applied,
            vec![
                CountAction { from: 0, to: 2 },
                CountAction { from: 2, to: 3 },
            ]
        );
        assert!(fixture.store.pending("counting").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pruned_states_are_dropped() {
        let mut fixture = make_fixture();
        feed_block(&mut fixture, make_block(100, 1, 0, vec![])).await;

        fixture
            .driver
            .process_event(&BlockEvent::Pruned(vec![hash(1)]))
            .await
            .unwrap();

        assert_eq!(fixture.driver.state(&hash(1)), None);
    }

    #[tokio::test]
    async fn test_unknown_prev_diffs_against_base_state() {
        let mut fixture = make_fixture();
        feed_block(&mut fixture, make_block(100, 1, 0, vec![])).await;

        fixture
            .driver
            .process_event(&BlockEvent::NewHead {
                prev: Some(hash(9)),
                new: hash(1),
            })
            .await
            .unwrap();

        let applied = fixture.component.applied.lock().clone();
        assert_eq!(applied, vec![CountAction { from: 0, to: 1 }]);
    }
}
