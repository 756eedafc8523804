//! The watcher's responder-facing component.
//!
//! Appointments are *armed* with the fingerprint of the transaction that
//! triggers them. Once a trigger is buried deeply enough, the appointment
//! is handed to the multi-responder. Decoding triggers out of raw chain
//! data is the intake's concern; by the time an appointment is armed its
//! trigger is already a concrete fingerprint.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use pisa_chain::ChainClient;
use pisa_primitives::{Appointment, AppointmentId, Block, TransactionIdentifier};
use pisa_state_machine::Component;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    estimator::GasEstimator,
    responder::MultiResponder,
    signer::Signer,
    store::ResponderStore,
};

/// An appointment waiting for its trigger.
#[derive(Debug, Clone)]
pub struct ArmedAppointment {
    /// The appointment to respond to.
    pub appointment: Appointment,
    /// Fingerprint of the transaction that triggers the response.
    pub trigger: TransactionIdentifier,
}

/// Per-appointment trigger state at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAnchorState {
    /// The trigger has not appeared in this head's ancestry.
    Unobserved,
    /// The trigger was observed at the given height.
    Observed { block_observed: u64 },
}

/// The watcher component's anchor state at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherAnchorState {
    /// Height of the anchoring block.
    pub block_number: u64,
    /// Trigger state per armed appointment.
    pub items: BTreeMap<AppointmentId, TriggerAnchorState>,
}

/// Action derived from watcher head changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatcherAction {
    /// A trigger is buried deeply enough; start responding.
    StartResponse { appointment_id: AppointmentId },
}

/// Second state-machine component: watches armed appointments' triggers
/// and hands triggered appointments to the responder.
pub struct WatcherComponent<C, S, E, St> {
    responder: Arc<MultiResponder<C, S, E, St>>,
    armed: RwLock<BTreeMap<AppointmentId, ArmedAppointment>>,
    response_confirmations: u64,
}

impl<C, S, E, St> std::fmt::Debug for WatcherComponent<C, S, E, St> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherComponent")
            .field("armed", &self.armed.read().len())
            .field("response_confirmations", &self.response_confirmations)
            .finish_non_exhaustive()
    }
}

impl<C, S, E, St> WatcherComponent<C, S, E, St>
where
    C: ChainClient,
    S: Signer,
    E: GasEstimator,
    St: ResponderStore,
{
    /// Creates a watcher handing triggered appointments to `responder`
    /// after `response_confirmations` blocks.
    pub fn new(
        responder: Arc<MultiResponder<C, S, E, St>>,
        response_confirmations: u64,
    ) -> Self {
        Self {
            responder,
            armed: RwLock::new(BTreeMap::new()),
            response_confirmations,
        }
    }

    /// Arms an appointment against its trigger fingerprint.
    pub fn arm(&self, appointment: Appointment, trigger: TransactionIdentifier) {
        let id = appointment.id;
        self.armed.write().insert(
            id,
            ArmedAppointment {
                appointment,
                trigger,
            },
        );
        debug!(appointment = %id, "appointment armed");
    }

    /// Drops an armed appointment without responding.
    pub fn disarm(&self, id: &AppointmentId) {
        self.armed.write().remove(id);
    }

    /// Number of appointments still waiting on their trigger.
    pub fn armed_count(&self) -> usize {
        self.armed.read().len()
    }

    fn trigger_in_block(trigger: &TransactionIdentifier, block: &Block) -> bool {
        block.transactions.iter().any(|tx| trigger.matches(tx))
    }
}

#[async_trait]
impl<C, S, E, St> Component for WatcherComponent<C, S, E, St>
where
    C: ChainClient,
    S: Signer,
    E: GasEstimator,
    St: ResponderStore,
{
    type State = WatcherAnchorState;
    type Action = WatcherAction;

    fn name(&self) -> &'static str {
        "watcher"
    }

    fn initial_state(&self, block: &Block) -> WatcherAnchorState {
        // Triggers are other parties' transactions, so unlike the
        // responder there is no ancestry to scan here: anything armed
        // before startup is observed from this block forward.
        let mut items = BTreeMap::new();
        for (id, armed) in self.armed.read().iter() {
            let state = if Self::trigger_in_block(&armed.trigger, block) {
                TriggerAnchorState::Observed {
                    block_observed: block.number,
                }
            } else {
                TriggerAnchorState::Unobserved
            };
            items.insert(*id, state);
        }
        WatcherAnchorState {
            block_number: block.number,
            items,
        }
    }

    fn reduce(&self, prev: &WatcherAnchorState, block: &Block) -> WatcherAnchorState {
        let mut items = BTreeMap::new();
        for (id, armed) in self.armed.read().iter() {
            let state = match prev.items.get(id) {
                Some(observed @ TriggerAnchorState::Observed { .. }) => observed.clone(),
                _ => {
                    if Self::trigger_in_block(&armed.trigger, block) {
                        TriggerAnchorState::Observed {
                            block_observed: block.number,
                        }
                    } else {
                        TriggerAnchorState::Unobserved
                    }
                }
            };
            items.insert(*id, state);
        }
        WatcherAnchorState {
            block_number: block.number,
            items,
        }
    }

    fn base_state(&self) -> WatcherAnchorState {
        WatcherAnchorState {
            block_number: 0,
            items: BTreeMap::new(),
        }
    }

    fn detect_changes(
        &self,
        prev: &WatcherAnchorState,
        next: &WatcherAnchorState,
    ) -> Vec<WatcherAction> {
        let mut actions = Vec::new();
        for (id, state) in &next.items {
            let TriggerAnchorState::Observed { block_observed } = state else {
                continue;
            };

            let buried =
                next.block_number.saturating_sub(*block_observed) >= self.response_confirmations;
            let previously_buried = match prev.items.get(id) {
                Some(TriggerAnchorState::Observed {
                    block_observed: prev_observed,
                }) => {
                    prev.block_number.saturating_sub(*prev_observed)
                        >= self.response_confirmations
                }
                _ => false,
            };
            if buried && !previously_buried {
                actions.push(WatcherAction::StartResponse {
                    appointment_id: *id,
                });
            }
        }
        actions
    }

    async fn apply_action(&self, action: WatcherAction) -> eyre::Result<()> {
        match action {
            WatcherAction::StartResponse { appointment_id } => {
                let armed = self.armed.read().get(&appointment_id).cloned();
                let Some(armed) = armed else {
                    debug!(appointment = %appointment_id, "trigger fired for disarmed appointment");
                    return Ok(());
                };
                self.responder.start_response(armed.appointment).await?;
                self.armed.write().remove(&appointment_id);
                Ok(())
            }
        }
    }
}
