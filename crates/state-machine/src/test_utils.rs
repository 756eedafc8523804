//! In-memory action store for tests.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::action_store::{ActionId, ActionStore, ActionStoreError};

#[derive(Debug, Default)]
struct MemoryActionStoreInner {
    next_id: ActionId,
    staged: BTreeMap<(String, ActionId), Vec<u8>>,
}

/// [`ActionStore`] holding staged actions in memory. Loses everything on
/// drop, which is exactly what crash-recovery tests need to control.
#[derive(Debug, Default)]
pub struct MemoryActionStore {
    inner: Mutex<MemoryActionStoreInner>,
}

impl ActionStore for MemoryActionStore {
    fn append(&self, component: &str, payload: &[u8]) -> Result<ActionId, ActionStoreError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.staged.insert((component.to_owned(), id), payload.to_vec());
        Ok(id)
    }

    fn remove(&self, component: &str, id: ActionId) -> Result<(), ActionStoreError> {
        self.inner.lock().staged.remove(&(component.to_owned(), id));
        Ok(())
    }

    fn pending(&self, component: &str) -> Result<Vec<(ActionId, Vec<u8>)>, ActionStoreError> {
        Ok(self
            .inner
            .lock()
            .staged
            .iter()
            .filter(|((name, _), _)| name == component)
            .map(|((_, id), payload)| (*id, payload.clone()))
            .collect())
    }
}
