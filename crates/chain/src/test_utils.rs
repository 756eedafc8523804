//! Scripted chain double shared by unit and integration tests.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use pisa_primitives::{Block, Transaction};

use crate::{client::ChainClient, error::ChainClientError};

/// Block `id` at `number` on top of parent `parent_id`, using repeated-byte
/// hashes so test failures stay readable.
pub fn make_block(number: u64, id: u8, parent_id: u8, transactions: Vec<Transaction>) -> Block {
    Block::new(
        B256::repeat_byte(id),
        B256::repeat_byte(parent_id),
        number,
        transactions,
    )
}

/// A scripted chain seeded with one canonical block.
pub fn make_chain(height: u64, id: u8) -> ScriptedChain {
    let chain = ScriptedChain::default();
    chain.extend_canonical(make_block(height, id, 0, vec![]));
    chain
}

#[derive(Debug, Default)]
struct ScriptedChainInner {
    /// Every block ever produced, canonical or not.
    blocks: HashMap<B256, Block>,
    /// Canonical hash per height; a reorg overwrites entries.
    canonical: BTreeMap<u64, B256>,
    tip: u64,
    gas_price: U256,
    balances: HashMap<Address, U256>,
    transaction_counts: HashMap<Address, u64>,
    sent: Vec<Bytes>,
    fail_sends: bool,
}

/// Programmable [`ChainClient`] double.
///
/// Tests extend the canonical chain block by block and push tip heights
/// into the processor's notification channel themselves; reorgs are
/// modelled by re-extending lower heights with a competing branch.
#[derive(Debug, Default)]
pub struct ScriptedChain {
    inner: Mutex<ScriptedChainInner>,
}

impl ScriptedChain {
    /// Appends a block and makes it canonical at its height.
    pub fn extend_canonical(&self, block: Block) {
        let mut inner = self.inner.lock();
        inner.canonical.insert(block.number, block.hash);
        inner.tip = inner.tip.max(block.number);
        inner.blocks.insert(block.hash, block);
    }

    /// Drops canonical entries above `height`, as after a reorg to a
    /// shorter branch. Non-canonical blocks stay fetchable by hash.
    pub fn truncate_canonical(&self, height: u64) {
        let mut inner = self.inner.lock();
        inner.canonical.split_off(&(height + 1));
        inner.tip = height;
    }

    pub fn set_gas_price(&self, price: U256) {
        self.inner.lock().gas_price = price;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.inner.lock().balances.insert(address, balance);
    }

    pub fn set_transaction_count(&self, address: Address, count: u64) {
        self.inner
            .lock()
            .transaction_counts
            .insert(address, count);
    }

    /// Makes every subsequent submission fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Raw transactions submitted so far.
    pub fn sent_transactions(&self) -> Vec<Bytes> {
        self.inner.lock().sent.clone()
    }

    pub fn clear_sent_transactions(&self) {
        self.inner.lock().sent.clear();
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, ChainClientError> {
        Ok(self.inner.lock().blocks.get(&hash).cloned())
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, ChainClientError> {
        let inner = self.inner.lock();
        Ok(inner
            .canonical
            .get(&number)
            .and_then(|hash| inner.blocks.get(hash))
            .cloned())
    }

    async fn block_number(&self) -> Result<u64, ChainClientError> {
        Ok(self.inner.lock().tip)
    }

    async fn gas_price(&self) -> Result<U256, ChainClientError> {
        Ok(self.inner.lock().gas_price)
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainClientError> {
        Ok(self
            .inner
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ChainClientError> {
        Ok(self
            .inner
            .lock()
            .transaction_counts
            .get(&address)
            .copied()
            .unwrap_or(0))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<(), ChainClientError> {
        let mut inner = self.inner.lock();
        if inner.fail_sends {
            return Err(ChainClientError::Transport("scripted send failure".into()));
        }
        inner.sent.push(raw);
        Ok(())
    }
}
