//! Shared fixtures for responder tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pisa_chain::{test_utils::ScriptedChain, BlockCache, ChainClientError};
use pisa_config::ResponderConfig;
use pisa_gas_queue::{GasQueue, GasQueueItem};
use pisa_primitives::{Appointment, AppointmentId, ResponseData, Transaction};

use crate::{
    estimator::GasEstimator,
    responder::MultiResponder,
    signer::LocalSigner,
    store::{ResponderStore, ResponderStoreError, StoredResponderState},
};

/// Estimator returning a programmable price.
#[derive(Debug)]
pub struct FixedGasEstimator {
    price: Mutex<U256>,
    fail: AtomicBool,
}

impl FixedGasEstimator {
    pub fn new(price: u64) -> Self {
        Self {
            price: Mutex::new(U256::from(price)),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_price(&self, price: u64) {
        *self.price.lock() = U256::from(price);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GasEstimator for FixedGasEstimator {
    async fn estimate(&self, _response_data: &ResponseData) -> Result<U256, ChainClientError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChainClientError::Transport("estimator offline".into()));
        }
        Ok(*self.price.lock())
    }
}

#[derive(Debug, Default)]
struct MemoryStoreEntry {
    queue: Option<GasQueue>,
    responses: BTreeMap<AppointmentId, GasQueueItem>,
}

/// In-memory [`ResponderStore`] with switchable failure injection.
#[derive(Debug, Default)]
pub struct MemoryResponderStore {
    inner: Mutex<HashMap<Address, MemoryStoreEntry>>,
    fail: AtomicBool,
}

impl MemoryResponderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Records currently persisted for an address.
    pub fn response_count(&self, address: Address) -> usize {
        self.inner
            .lock()
            .get(&address)
            .map(|entry| entry.responses.len())
            .unwrap_or(0)
    }
}

impl ResponderStore for MemoryResponderStore {
    fn load(&self, address: Address) -> Result<Option<StoredResponderState>, ResponderStoreError> {
        let inner = self.inner.lock();
        Ok(inner.get(&address).and_then(|entry| {
            entry.queue.clone().map(|queue| StoredResponderState {
                queue,
                responses: entry.responses.clone(),
            })
        }))
    }

    fn update_queue(
        &self,
        address: Address,
        queue: &GasQueue,
        changed: &[GasQueueItem],
    ) -> Result<(), ResponderStoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResponderStoreError::Storage("injected failure".into()));
        }
        let mut inner = self.inner.lock();
        let entry = inner.entry(address).or_default();
        entry.queue = Some(queue.clone());
        for item in changed {
            entry.responses.insert(item.appointment_id(), item.clone());
        }
        Ok(())
    }

    fn remove_response(
        &self,
        address: Address,
        appointment_id: AppointmentId,
    ) -> Result<(), ResponderStoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResponderStoreError::Storage("injected failure".into()));
        }
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.get_mut(&address) {
            entry.responses.remove(&appointment_id);
        }
        Ok(())
    }
}

/// Appointment `id` calling a fixed contract with one-byte calldata.
pub fn make_appointment(id: u8) -> Appointment {
    Appointment {
        id: AppointmentId(B256::repeat_byte(id)),
        response_data: ResponseData {
            contract_address: Address::repeat_byte(0xcc),
            data: Bytes::copy_from_slice(&[id]),
            value: U256::ZERO,
            gas_limit: 400_000,
            chain_id: 1,
        },
    }
}

/// The appointment's response as it would appear mined in a block.
pub fn response_transaction(appointment: &Appointment, from: Address, nonce: u64) -> Transaction {
    let data = &appointment.response_data;
    Transaction {
        hash: B256::repeat_byte(0xf0 ^ appointment.id.as_bytes()[0]),
        from,
        to: data.contract_address,
        data: data.data.clone(),
        value: data.value,
        gas_limit: data.gas_limit,
        nonce,
        chain_id: data.chain_id,
    }
}

/// A fully wired responder over a scripted chain and in-memory store.
pub struct ResponderFixture {
    pub chain: Arc<ScriptedChain>,
    pub signer: Arc<LocalSigner>,
    pub estimator: Arc<FixedGasEstimator>,
    pub store: Arc<MemoryResponderStore>,
    pub cache: Arc<RwLock<BlockCache>>,
    pub responder:
        Arc<MultiResponder<ScriptedChain, LocalSigner, FixedGasEstimator, MemoryResponderStore>>,
}

impl std::fmt::Debug for ResponderFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderFixture").finish_non_exhaustive()
    }
}

/// Builds a responder fixture with the given config over a fresh chain.
pub async fn make_responder(config: &ResponderConfig) -> ResponderFixture {
    let chain = Arc::new(ScriptedChain::default());
    let signer = Arc::new(LocalSigner::from_bytes(&[0x42; 32], 1).unwrap());
    let estimator = Arc::new(FixedGasEstimator::new(100));
    let store = Arc::new(MemoryResponderStore::new());
    let cache = Arc::new(RwLock::new(BlockCache::new(config.max_reorg_depth())));

    let responder = Arc::new(
        MultiResponder::start(
            chain.clone(),
            signer.clone(),
            estimator.clone(),
            store.clone(),
            config,
        )
        .await
        .expect("fixture responder starts"),
    );

    ResponderFixture {
        chain,
        signer,
        estimator,
        store,
        cache,
        responder,
    }
}
