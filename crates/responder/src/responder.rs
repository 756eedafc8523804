//! The multi-responder: owns one signer's queue, nonce and broadcasts.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{Address, U256};
use pisa_chain::ChainClient;
use pisa_config::ResponderConfig;
use pisa_gas_queue::{GasQueue, GasQueueItem, GasQueueItemRequest};
use pisa_primitives::{Appointment, AppointmentId, TransactionIdentifier};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    error::ResponderError,
    estimator::GasEstimator,
    records::TrackedResponses,
    signer::Signer,
    store::ResponderStore,
};

/// Raised when the signer balance drops below the configured threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceAlert {
    /// The signer running low.
    pub address: Address,
    /// Balance observed, in wei.
    pub balance: U256,
    /// Configured low-water mark, in wei.
    pub threshold: U256,
}

/// Drives many concurrent responses through one signing key.
///
/// All public operations serialise on an internal lock, so the queue, its
/// nonce counter and the store always advance together. Within one
/// operation the store is written before anything is broadcast; broadcast
/// failures are swallowed because the queued item re-broadcasts on the
/// next queue change anyway.
pub struct MultiResponder<C, S, E, St> {
    client: Arc<C>,
    signer: Arc<S>,
    estimator: Arc<E>,
    store: Arc<St>,
    address: Address,
    tracked: TrackedResponses,
    queue: Mutex<GasQueue>,
    low_balance_threshold: U256,
    balance_alert_tx: watch::Sender<Option<BalanceAlert>>,
    balance_alert_rx: watch::Receiver<Option<BalanceAlert>>,
}

impl<C, S, E, St> std::fmt::Debug for MultiResponder<C, S, E, St> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiResponder")
            .field("address", &self.address)
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}

impl<C, S, E, St> MultiResponder<C, S, E, St>
where
    C: ChainClient,
    S: Signer,
    E: GasEstimator,
    St: ResponderStore,
{
    /// Starts a responder for the signer, reloading persisted state or
    /// seeding a fresh queue from the account's transaction count.
    pub async fn start(
        client: Arc<C>,
        signer: Arc<S>,
        estimator: Arc<E>,
        store: Arc<St>,
        config: &ResponderConfig,
    ) -> Result<Self, ResponderError> {
        let address = signer.address();

        let (queue, responses) = match store.load(address)? {
            Some(state) => {
                info!(
                    %address,
                    queued = state.queue.len(),
                    tracked = state.responses.len(),
                    "reloaded responder state"
                );
                (state.queue, state.responses)
            }
            None => {
                let nonce = client.transaction_count(address).await?;
                debug!(%address, nonce, "starting responder with fresh queue");
                (
                    GasQueue::new(
                        nonce,
                        config.replacement_rate_percent(),
                        config.max_queue_depth(),
                    ),
                    BTreeMap::new(),
                )
            }
        };

        let tracked = TrackedResponses::new();
        tracked.seed(responses);

        let (balance_alert_tx, balance_alert_rx) = watch::channel(None);
        Ok(Self {
            client,
            signer,
            estimator,
            store,
            address,
            tracked,
            queue: Mutex::new(queue),
            low_balance_threshold: config.low_balance_threshold(),
            balance_alert_tx,
            balance_alert_rx,
        })
    }

    /// Address of the responding signer.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The live response records, shared with the responder component's
    /// reducer.
    pub fn tracked(&self) -> &TrackedResponses {
        &self.tracked
    }

    /// Watcher over low-balance alerts.
    pub fn balance_alerts(&self) -> watch::Receiver<Option<BalanceAlert>> {
        self.balance_alert_rx.clone()
    }

    /// Snapshot of the current queue.
    pub async fn queue_snapshot(&self) -> GasQueue {
        self.queue.lock().await.clone()
    }

    /// Begins responding to an appointment.
    ///
    /// Prices the response, enqueues it, persists the new queue, then
    /// broadcasts the new item and every replacement the insertion caused.
    /// Argument errors (queue at depth) propagate; chain failures are
    /// logged and leave state untouched.
    pub async fn start_response(&self, appointment: Appointment) -> Result<(), ResponderError> {
        let identifier = appointment.response_data.identifier();

        let ideal_gas_price = match self.estimator.estimate(&appointment.response_data).await {
            Ok(price) => price,
            Err(err) => {
                warn!(
                    appointment = %appointment.id,
                    %err,
                    "failed to estimate gas price; response not started"
                );
                return Ok(());
            }
        };

        let mut queue = self.queue.lock().await;

        if queue.contains(&identifier) {
            debug!(appointment = %appointment.id, "response already queued");
            return Ok(());
        }

        let request = GasQueueItemRequest::new(
            appointment.id,
            identifier,
            ideal_gas_price,
            appointment.response_data.data.clone(),
        );
        let new_queue = queue.add(request)?;
        let changed = new_queue.difference(&queue);

        self.store.update_queue(self.address, &new_queue, &changed)?;
        for item in &changed {
            self.tracked.insert(item.appointment_id(), item.clone());
        }
        *queue = new_queue;

        info!(
            appointment = %appointment.id,
            ideal = %ideal_gas_price,
            broadcasts = changed.len(),
            "response started"
        );
        self.broadcast(&changed).await;
        Ok(())
    }

    /// Records that a queued response was observed mined at `nonce`.
    ///
    /// Mining at the head's exact slot just pops the queue. Mining
    /// anywhere else compacts the queue and rebroadcasts the re-priced
    /// items. Identifiers the queue no longer holds are ignored — replays
    /// after recovery hit this path.
    pub async fn tx_mined(
        &self,
        identifier: &TransactionIdentifier,
        nonce: u64,
    ) -> Result<(), ResponderError> {
        let mut queue = self.queue.lock().await;

        if !queue.contains(identifier) {
            debug!(%identifier, nonce, "mined response not in queue; nothing to do");
            return Ok(());
        }

        let head = queue.head().expect("queue non-empty").clone();
        if head.identifier() == identifier {
            if head.nonce != nonce {
                warn!(
                    %identifier,
                    expected = head.nonce,
                    mined = nonce,
                    "head mined at unexpected nonce; ignoring"
                );
                return Ok(());
            }
            let new_queue = queue.dequeue()?;
            self.store.update_queue(self.address, &new_queue, &[])?;
            *queue = new_queue;
            debug!(%identifier, nonce, "head response mined");
        } else {
            let new_queue = queue.consume(identifier)?;
            let changed = new_queue.difference(&queue);
            self.store.update_queue(self.address, &new_queue, &changed)?;
            for item in &changed {
                self.tracked.insert(item.appointment_id(), item.clone());
            }
            *queue = new_queue;
            debug!(
                %identifier,
                nonce,
                rebroadcasts = changed.len(),
                "off-head response mined; queue compacted"
            );
            self.broadcast(&changed).await;
        }
        Ok(())
    }

    /// Re-queues tracked responses a reorg evicted from the queue.
    ///
    /// Each missing appointment is re-introduced at its previously
    /// recorded nonce. Ids already queued are a no-op; unknown ids error.
    pub async fn re_enqueue_missing_items(
        &self,
        appointment_ids: &[AppointmentId],
    ) -> Result<(), ResponderError> {
        let mut queue = self.queue.lock().await;

        let mut missing = Vec::new();
        for id in appointment_ids {
            let record = self
                .tracked
                .get(id)
                .ok_or(ResponderError::UnknownAppointment(*id))?;
            if !queue.contains(record.identifier()) {
                missing.push(record);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let new_queue = queue.prepend(missing)?;
        let changed = new_queue.difference(&queue);
        self.store.update_queue(self.address, &new_queue, &changed)?;
        for item in &changed {
            self.tracked.insert(item.appointment_id(), item.clone());
        }
        *queue = new_queue;

        info!(broadcasts = changed.len(), "re-enqueued responses evicted by reorg");
        self.broadcast(&changed).await;
        Ok(())
    }

    /// Forgets an appointment once its response is buried deep enough.
    pub async fn end_response(&self, appointment_id: AppointmentId) -> Result<(), ResponderError> {
        // Hold the operation lock so the record cannot vanish between a
        // concurrent reducer snapshot and a queue mutation.
        let _queue = self.queue.lock().await;

        self.store.remove_response(self.address, appointment_id)?;
        self.tracked.remove(&appointment_id);
        info!(appointment = %appointment_id, "response complete");
        Ok(())
    }

    /// Reads the signer balance and raises an alert when it drops below
    /// the low-water mark.
    pub async fn check_balance(&self) -> Result<(), ResponderError> {
        let balance = self.client.balance(self.address).await?;
        if balance < self.low_balance_threshold {
            error!(
                address = %self.address,
                %balance,
                threshold = %self.low_balance_threshold,
                "responder balance below low-water mark"
            );
            let _ = self.balance_alert_tx.send(Some(BalanceAlert {
                address: self.address,
                balance,
                threshold: self.low_balance_threshold,
            }));
        }
        Ok(())
    }

    /// Signs and submits every given item. Failures are logged and
    /// swallowed: the items stay queued and re-broadcast on the next
    /// queue change.
    async fn broadcast(&self, items: &[GasQueueItem]) {
        for item in items {
            let fields = item.transaction_fields();
            let raw = match self.signer.sign_transaction(&fields) {
                Ok(raw) => raw,
                Err(err) => {
                    error!(
                        item = %item.identifier(),
                        nonce = item.nonce,
                        %err,
                        "failed to sign response"
                    );
                    continue;
                }
            };
            if let Err(err) = self.client.send_raw_transaction(raw).await {
                warn!(
                    item = %item.identifier(),
                    nonce = item.nonce,
                    gas_price = %item.nonce_gas_price,
                    %err,
                    "failed to broadcast response; will retry on next queue change"
                );
            }
        }
    }
}
