//! sled-backed responder store.

use std::collections::BTreeMap;

use alloy_primitives::B256;
use pisa_gas_queue::{GasQueue, GasQueueItem};
use pisa_primitives::{Address, AppointmentId};
use pisa_responder::{ResponderStore, ResponderStoreError, StoredResponderState};
use sled::{transaction::ConflictableTransactionError, Transactional};
use tracing::debug;

use crate::{codec, error::DbError};

const QUEUES_TREE: &str = "responder_queues";
const RECORDS_TREE: &str = "responder_records";

/// Persists each responder's queue and per-appointment records.
///
/// Queues are keyed by signer address; records by `address ++
/// appointment_id` so one prefix scan reloads a responder. Queue and
/// record writes share a cross-tree transaction, which is what makes
/// `update_queue` atomic.
#[derive(Debug, Clone)]
pub struct SledResponderStore {
    queues: sled::Tree,
    records: sled::Tree,
}

impl SledResponderStore {
    /// Opens the store's trees on a shared database.
    pub fn new(db: &sled::Db) -> Result<Self, DbError> {
        Ok(Self {
            queues: db.open_tree(QUEUES_TREE)?,
            records: db.open_tree(RECORDS_TREE)?,
        })
    }
}

fn record_key(address: Address, appointment_id: AppointmentId) -> [u8; 52] {
    let mut key = [0u8; 52];
    key[..20].copy_from_slice(address.as_slice());
    key[20..].copy_from_slice(appointment_id.as_bytes());
    key
}

impl ResponderStore for SledResponderStore {
    fn load(&self, address: Address) -> Result<Option<StoredResponderState>, ResponderStoreError> {
        let Some(queue_bytes) = self.queues.get(address.as_slice()).map_err(DbError::from)? else {
            return Ok(None);
        };
        let queue: GasQueue = codec::decode(&queue_bytes)?;

        let mut responses = BTreeMap::new();
        for entry in self.records.scan_prefix(address.as_slice()) {
            let (key, value) = entry.map_err(DbError::from)?;
            if key.len() != 52 {
                return Err(ResponderStoreError::Corrupt(format!(
                    "record key of length {}",
                    key.len()
                )));
            }
            let appointment_id = AppointmentId(B256::from_slice(&key[20..]));
            let item: GasQueueItem = codec::decode(&value)?;
            responses.insert(appointment_id, item);
        }

        debug!(%address, responses = responses.len(), "loaded responder state");
        Ok(Some(StoredResponderState { queue, responses }))
    }

    fn update_queue(
        &self,
        address: Address,
        queue: &GasQueue,
        changed: &[GasQueueItem],
    ) -> Result<(), ResponderStoreError> {
        let queue_bytes = codec::encode(queue)?;
        let mut record_writes = Vec::with_capacity(changed.len());
        for item in changed {
            record_writes.push((
                record_key(address, item.appointment_id()),
                codec::encode(item)?,
            ));
        }

        (&self.queues, &self.records)
            .transaction(|(queues, records)| {
                queues.insert(address.as_slice(), queue_bytes.clone())?;
                for (key, value) in &record_writes {
                    records.insert(key.as_slice(), value.clone())?;
                }
                Ok::<(), ConflictableTransactionError<sled::Error>>(())
            })
            .map_err(|err| ResponderStoreError::Storage(err.to_string()))?;

        Ok(())
    }

    fn remove_response(
        &self,
        address: Address,
        appointment_id: AppointmentId,
    ) -> Result<(), ResponderStoreError> {
        self.records
            .remove(record_key(address, appointment_id))
            .map_err(DbError::from)?;
        Ok(())
    }
}
