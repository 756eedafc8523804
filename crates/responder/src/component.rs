//! The responder's state-machine binding.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use pisa_chain::{BlockCache, ChainClient};
use pisa_primitives::{AppointmentId, Block, TransactionIdentifier};
use pisa_state_machine::Component;
use serde::{Deserialize, Serialize};

use crate::{
    estimator::GasEstimator,
    records::{AppointmentAnchorState, ResponderAnchorState},
    responder::MultiResponder,
    signer::Signer,
    store::ResponderStore,
};

/// Effects the responder component derives from head changes.
///
/// Every variant dispatches to a multi-responder operation that is
/// idempotent, so replaying any of these after a crash is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponderAction {
    /// Responses believed pending must be in the queue; re-introduce any a
    /// reorg evicted.
    ReEnqueueMissingItems { appointment_ids: Vec<AppointmentId> },
    /// A response was observed mined.
    TxMined {
        identifier: TransactionIdentifier,
        nonce: u64,
    },
    /// A response is buried deeply enough to forget.
    EndResponse { appointment_id: AppointmentId },
    /// A response just mined; make sure the signer can afford the rest.
    CheckBalance,
}

/// State-machine component tracking every live response through the chain.
///
/// The reducer lifts a [`ResponderAnchorState`] per block: an appointment
/// is `Mined` once a transaction from the responder's own address carrying
/// its fingerprint appears in the block's ancestry, `Pending` otherwise.
pub struct ResponderComponent<C, S, E, St> {
    responder: Arc<MultiResponder<C, S, E, St>>,
    cache: Arc<RwLock<BlockCache>>,
    confirmations_required: u64,
}

impl<C, S, E, St> std::fmt::Debug for ResponderComponent<C, S, E, St> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderComponent")
            .field("confirmations_required", &self.confirmations_required)
            .finish_non_exhaustive()
    }
}

impl<C, S, E, St> ResponderComponent<C, S, E, St>
where
    C: ChainClient,
    S: Signer,
    E: GasEstimator,
    St: ResponderStore,
{
    /// Binds the component to a responder and the shared block cache.
    pub fn new(
        responder: Arc<MultiResponder<C, S, E, St>>,
        cache: Arc<RwLock<BlockCache>>,
        confirmations_required: u64,
    ) -> Self {
        Self {
            responder,
            cache,
            confirmations_required,
        }
    }

    /// Finds this appointment's response in one block, returning the
    /// mining height and nonce.
    fn find_in_block(
        &self,
        identifier: &TransactionIdentifier,
        block: &Block,
    ) -> Option<(u64, u64)> {
        let address = self.responder.address();
        block
            .transactions
            .iter()
            .find(|tx| tx.from == address && identifier.matches(tx))
            .map(|tx| (block.number, tx.nonce))
    }
}

#[async_trait]
impl<C, S, E, St> Component for ResponderComponent<C, S, E, St>
where
    C: ChainClient,
    S: Signer,
    E: GasEstimator,
    St: ResponderStore,
{
    type State = ResponderAnchorState;
    type Action = ResponderAction;

    fn name(&self) -> &'static str {
        "responder"
    }

    fn initial_state(&self, block: &Block) -> ResponderAnchorState {
        // No predecessor state to build on: scan the whole cached ancestry
        // for already-mined responses.
        let cache = self.cache.read();
        let mut items = BTreeMap::new();

        for (id, record) in self.responder.tracked().snapshot() {
            let identifier = record.identifier().clone();
            let mined = cache
                .ancestry(block.hash)
                .find_map(|ancestor| self.find_in_block(&identifier, ancestor));
            let state = match mined {
                Some((block_mined, nonce)) => AppointmentAnchorState::Mined {
                    identifier,
                    block_mined,
                    nonce,
                },
                None => AppointmentAnchorState::Pending { identifier },
            };
            items.insert(id, state);
        }

        ResponderAnchorState {
            block_number: block.number,
            items,
        }
    }

    fn reduce(&self, prev: &ResponderAnchorState, block: &Block) -> ResponderAnchorState {
        let mut items = BTreeMap::new();

        for (id, record) in self.responder.tracked().snapshot() {
            let identifier = record.identifier().clone();
            let state = match prev.items.get(&id) {
                // Mined stays mined along this branch.
                Some(mined @ AppointmentAnchorState::Mined { .. }) => mined.clone(),
                _ => match self.find_in_block(&identifier, block) {
                    Some((block_mined, nonce)) => AppointmentAnchorState::Mined {
                        identifier,
                        block_mined,
                        nonce,
                    },
                    None => AppointmentAnchorState::Pending { identifier },
                },
            };
            items.insert(id, state);
        }

        ResponderAnchorState {
            block_number: block.number,
            items,
        }
    }

    fn base_state(&self) -> ResponderAnchorState {
        ResponderAnchorState::empty()
    }

    fn detect_changes(
        &self,
        prev: &ResponderAnchorState,
        next: &ResponderAnchorState,
    ) -> Vec<ResponderAction> {
        let mut actions = Vec::new();

        // Everything pending on the new head must sit in the queue; after
        // a reorg some of it may have been evicted.
        let pending_ids: Vec<AppointmentId> = next
            .items
            .iter()
            .filter(|(_, state)| state.is_pending())
            .map(|(id, _)| *id)
            .collect();
        if !pending_ids.is_empty() {
            actions.push(ResponderAction::ReEnqueueMissingItems {
                appointment_ids: pending_ids,
            });
        }

        for (id, state) in &next.items {
            let AppointmentAnchorState::Mined {
                identifier,
                block_mined,
                nonce,
            } = state
            else {
                continue;
            };

            let previously_mined = matches!(
                prev.items.get(id),
                Some(AppointmentAnchorState::Mined { .. })
            );
            if !previously_mined {
                actions.push(ResponderAction::TxMined {
                    identifier: identifier.clone(),
                    nonce: *nonce,
                });
                actions.push(ResponderAction::CheckBalance);
            }

            let buried = next.block_number.saturating_sub(*block_mined) > self.confirmations_required;
            let previously_buried = match prev.items.get(id) {
                Some(AppointmentAnchorState::Mined {
                    block_mined: prev_mined,
                    ..
                }) => prev.block_number.saturating_sub(*prev_mined) > self.confirmations_required,
                _ => false,
            };
            if buried && !previously_buried {
                actions.push(ResponderAction::EndResponse {
                    appointment_id: *id,
                });
            }
        }

        actions
    }

    async fn apply_action(&self, action: ResponderAction) -> eyre::Result<()> {
        match action {
            ResponderAction::ReEnqueueMissingItems { appointment_ids } => {
                self.responder
                    .re_enqueue_missing_items(&appointment_ids)
                    .await?
            }
            ResponderAction::TxMined { identifier, nonce } => {
                self.responder.tx_mined(&identifier, nonce).await?
            }
            ResponderAction::EndResponse { appointment_id } => {
                self.responder.end_response(appointment_id).await?
            }
            ResponderAction::CheckBalance => self.responder.check_balance().await?,
        }
        Ok(())
    }
}
