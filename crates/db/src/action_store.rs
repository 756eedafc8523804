//! sled-backed action store.

use pisa_state_machine::{ActionId, ActionStore, ActionStoreError};
use tracing::debug;

use crate::error::DbError;

const ACTIONS_TREE: &str = "component_actions";

/// Stages component actions between detection and execution.
///
/// Keys are `component ++ '/' ++ big-endian id`, so a prefix scan yields a
/// component's staged actions in the order they were appended and replay
/// preserves the order `detect_changes` produced.
#[derive(Debug, Clone)]
pub struct SledActionStore {
    db: sled::Db,
    actions: sled::Tree,
}

impl SledActionStore {
    /// Opens the action tree on a shared database.
    pub fn new(db: &sled::Db) -> Result<Self, DbError> {
        Ok(Self {
            db: db.clone(),
            actions: db.open_tree(ACTIONS_TREE)?,
        })
    }
}

fn action_key(component: &str, id: ActionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(component.len() + 9);
    key.extend_from_slice(component.as_bytes());
    key.push(b'/');
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn prefix(component: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(component.len() + 1);
    prefix.extend_from_slice(component.as_bytes());
    prefix.push(b'/');
    prefix
}

impl ActionStore for SledActionStore {
    fn append(&self, component: &str, payload: &[u8]) -> Result<ActionId, ActionStoreError> {
        let id = self.db.generate_id().map_err(DbError::from)?;
        self.actions
            .insert(action_key(component, id), payload)
            .map_err(DbError::from)?;
        debug!(component, id, "staged action");
        Ok(id)
    }

    fn remove(&self, component: &str, id: ActionId) -> Result<(), ActionStoreError> {
        self.actions
            .remove(action_key(component, id))
            .map_err(DbError::from)?;
        Ok(())
    }

    fn pending(&self, component: &str) -> Result<Vec<(ActionId, Vec<u8>)>, ActionStoreError> {
        let prefix = prefix(component);
        let mut staged = Vec::new();
        for entry in self.actions.scan_prefix(&prefix) {
            let (key, value) = entry.map_err(DbError::from)?;
            let id_bytes: [u8; 8] = key[prefix.len()..]
                .try_into()
                .map_err(|_| ActionStoreError::Storage("malformed action key".into()))?;
            staged.push((ActionId::from_be_bytes(id_bytes), value.to_vec()));
        }
        Ok(staged)
    }
}
