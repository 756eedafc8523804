//! The nonce-ordered, price-prioritised response queue.

use std::collections::HashSet;

use alloy_primitives::U256;
use pisa_primitives::TransactionIdentifier;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    error::GasQueueError,
    item::{GasQueueItem, GasQueueItemRequest},
};

/// Immutable queue of response transactions awaiting mining.
///
/// Items occupy consecutive nonces and are ordered by descending ideal gas
/// price, so the response that pays the most always sits at the lowest
/// nonce and is mined first. Every operation returns a fresh queue and
/// leaves the input untouched.
///
/// Whenever an item moves to a different nonce slot, its submission price
/// must exceed the price of the transaction already pending at that nonce
/// by the replacement rate, otherwise the network's mempool would silently
/// drop the replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasQueue {
    items: Vec<GasQueueItem>,
    /// The next unused nonce. Equals `last item nonce + 1` when non-empty.
    empty_nonce: u64,
    /// Minimum percentage increase for replacing a pending transaction.
    replacement_rate_percent: u64,
    /// Maximum number of outstanding items.
    max_queue_depth: usize,
}

impl GasQueue {
    /// Creates an empty queue starting at the given nonce.
    pub fn new(empty_nonce: u64, replacement_rate_percent: u64, max_queue_depth: usize) -> Self {
        Self::checked(Vec::new(), empty_nonce, replacement_rate_percent, max_queue_depth)
    }

    /// Reconstructs a queue from externally supplied parts, e.g. a store
    /// load. Every invariant is re-checked; violations are argument errors
    /// rather than panics since the data did not come from queue
    /// arithmetic.
    pub fn from_parts(
        items: Vec<GasQueueItem>,
        empty_nonce: u64,
        replacement_rate_percent: u64,
        max_queue_depth: usize,
    ) -> Result<Self, GasQueueError> {
        let queue = Self {
            items,
            empty_nonce,
            replacement_rate_percent,
            max_queue_depth,
        };
        queue.validate()?;
        Ok(queue)
    }

    /// Internal constructor for results of queue arithmetic. A violation
    /// here is a bug, and aborting beats persisting a corrupt queue.
    fn checked(
        items: Vec<GasQueueItem>,
        empty_nonce: u64,
        replacement_rate_percent: u64,
        max_queue_depth: usize,
    ) -> Self {
        match Self::from_parts(items, empty_nonce, replacement_rate_percent, max_queue_depth) {
            Ok(queue) => queue,
            Err(err) => {
                error!(%err, "gas queue invariant violated");
                panic!("gas queue invariant violated: {err}");
            }
        }
    }

    fn validate(&self) -> Result<(), GasQueueError> {
        if self.replacement_rate_percent < 1 {
            return Err(GasQueueError::Invalid("replacement rate below 1 percent"));
        }
        if self.max_queue_depth < 1 {
            return Err(GasQueueError::Invalid("max queue depth below 1"));
        }
        if self.items.len() > self.max_queue_depth {
            return Err(GasQueueError::Invalid("more items than max queue depth"));
        }

        let mut identifiers = HashSet::with_capacity(self.items.len());
        for (index, item) in self.items.iter().enumerate() {
            if item.nonce_gas_price < item.ideal_gas_price {
                return Err(GasQueueError::Invalid("submission price below ideal"));
            }
            if item.ideal_gas_price != item.request.ideal_gas_price {
                return Err(GasQueueError::Invalid("item ideal diverges from request"));
            }
            if !identifiers.insert(item.identifier()) {
                return Err(GasQueueError::Invalid("duplicate identifier"));
            }
            if index > 0 {
                let prev = &self.items[index - 1];
                if item.nonce != prev.nonce + 1 {
                    return Err(GasQueueError::Invalid("nonces not consecutive"));
                }
                if item.ideal_gas_price > prev.ideal_gas_price {
                    return Err(GasQueueError::Invalid("ideal prices not descending"));
                }
            }
        }

        if let Some(last) = self.items.last() {
            if last.nonce + 1 != self.empty_nonce {
                return Err(GasQueueError::Invalid("empty nonce does not follow last item"));
            }
        }

        Ok(())
    }

    /// Smallest price accepted by the mempool as a replacement for a
    /// pending transaction at `prior`, rounded up.
    fn replacement_price(&self, prior: U256) -> U256 {
        let rate = U256::from(100 + self.replacement_rate_percent);
        (prior * rate + U256::from(99u64)) / U256::from(100u64)
    }

    /// Price for an item moving between nonce slots: its own previous
    /// price bumped by the replacement rate, floored at its ideal.
    fn shifted_price(&self, item: &GasQueueItem) -> U256 {
        self.replacement_price(item.nonce_gas_price)
            .max(item.ideal_gas_price)
    }

    /// Adds a request, preserving nonce and price ordering.
    ///
    /// A request pricing below everything queued is appended at the empty
    /// nonce. Otherwise it takes over the slot of the first item it
    /// out-bids; that item and everything after it shift one nonce up, each
    /// shifted item re-priced so the mempool accepts the replacement.
    pub fn add(&self, request: GasQueueItemRequest) -> Result<Self, GasQueueError> {
        if self.depth_reached() {
            return Err(GasQueueError::DepthReached(self.max_queue_depth));
        }
        if self.contains(&request.identifier) {
            return Err(GasQueueError::DuplicateIdentifier(
                request.identifier.to_string(),
            ));
        }

        let insert_at = self
            .items
            .iter()
            .position(|item| request.ideal_gas_price > item.ideal_gas_price);

        let Some(insert_at) = insert_at else {
            let mut items = self.items.clone();
            let price = request.ideal_gas_price;
            items.push(GasQueueItem::new(request, price, self.empty_nonce));
            return Ok(Self::checked(
                items,
                self.empty_nonce + 1,
                self.replacement_rate_percent,
                self.max_queue_depth,
            ));
        };

        let mut items = self.items[..insert_at].to_vec();

        // The new request replaces the pending transaction at this slot, so
        // it must out-bid that transaction's current price.
        let displaced = &self.items[insert_at];
        let price = self
            .replacement_price(displaced.nonce_gas_price)
            .max(request.ideal_gas_price);
        items.push(GasQueueItem::new(request, price, displaced.nonce));

        for shifted in &self.items[insert_at..] {
            let dest_nonce = shifted.nonce + 1;
            items.push(GasQueueItem::new(
                shifted.request.clone(),
                self.shifted_price(shifted),
                dest_nonce,
            ));
        }

        Ok(Self::checked(
            items,
            self.empty_nonce + 1,
            self.replacement_rate_percent,
            self.max_queue_depth,
        ))
    }

    /// Removes an item observed mined somewhere other than the head slot,
    /// compacting the queue by shifting everything below it one nonce up.
    pub fn consume(&self, identifier: &TransactionIdentifier) -> Result<Self, GasQueueError> {
        let mined = self
            .items
            .iter()
            .position(|item| item.identifier() == identifier)
            .ok_or_else(|| GasQueueError::UnknownIdentifier(identifier.to_string()))?;

        let mut items = Vec::with_capacity(self.items.len() - 1);
        for shifted in &self.items[..mined] {
            items.push(GasQueueItem::new(
                shifted.request.clone(),
                self.shifted_price(shifted),
                shifted.nonce + 1,
            ));
        }
        items.extend_from_slice(&self.items[mined + 1..]);

        Ok(Self::checked(
            items,
            self.empty_nonce,
            self.replacement_rate_percent,
            self.max_queue_depth,
        ))
    }

    /// Drops the head without re-pricing anything. Used when the head was
    /// mined at exactly its current nonce.
    pub fn dequeue(&self) -> Result<Self, GasQueueError> {
        if self.items.is_empty() {
            return Err(GasQueueError::Empty);
        }
        Ok(Self::checked(
            self.items[1..].to_vec(),
            self.empty_nonce,
            self.replacement_rate_percent,
            self.max_queue_depth,
        ))
    }

    /// Re-introduces items at nonces strictly below every queued item,
    /// e.g. after a reorg un-mined responses whose nonces the queue had
    /// already moved past.
    ///
    /// If the combined nonce order disagrees with the descending-ideal
    /// order, requests are reassigned to slots until both orders coincide,
    /// re-pricing every slot whose request changed.
    pub fn prepend(&self, lower_items: Vec<GasQueueItem>) -> Result<Self, GasQueueError> {
        if lower_items.is_empty() {
            return Ok(self.clone());
        }
        if self.items.len() + lower_items.len() > self.max_queue_depth {
            return Err(GasQueueError::DepthReached(self.max_queue_depth));
        }
        for item in &lower_items {
            if self.contains(item.identifier()) {
                return Err(GasQueueError::DuplicateIdentifier(
                    item.identifier().to_string(),
                ));
            }
        }

        let mut union = lower_items;
        union.sort_by_key(|item| item.nonce);

        if union.windows(2).any(|pair| pair[0].nonce == pair[1].nonce) {
            return Err(GasQueueError::OverlappingNonces);
        }
        if let (Some(highest_new), Some(head)) = (union.last(), self.items.first()) {
            if highest_new.nonce >= head.nonce {
                return Err(GasQueueError::OverlappingNonces);
            }
        }
        union.extend_from_slice(&self.items);

        let ordered = union
            .windows(2)
            .all(|pair| pair[1].ideal_gas_price <= pair[0].ideal_gas_price);
        let items = if ordered {
            union
        } else {
            let slots: Vec<(u64, U256)> = union
                .iter()
                .map(|item| (item.nonce, item.nonce_gas_price))
                .collect();
            let mut by_price: Vec<GasQueueItem> = union;
            // Stable, so equal prices keep their nonce order.
            by_price.sort_by(|a, b| b.ideal_gas_price.cmp(&a.ideal_gas_price));

            slots
                .into_iter()
                .zip(by_price)
                .map(|((nonce, old_price), item)| {
                    if item.nonce == nonce {
                        item
                    } else {
                        let price = self
                            .replacement_price(old_price)
                            .max(item.ideal_gas_price)
                            .max(item.nonce_gas_price);
                        GasQueueItem::new(item.request, price, nonce)
                    }
                })
                .collect()
        };

        // Prepended data came from the caller; gaps or bad prices are
        // argument errors, not bugs.
        Self::from_parts(
            items,
            self.empty_nonce,
            self.replacement_rate_percent,
            self.max_queue_depth,
        )
    }

    /// Items present in `self` but not in `other`, compared by
    /// `(nonce, identifier)`. These are exactly the transactions that must
    /// be (re-)broadcast after replacing `other` with `self`.
    pub fn difference(&self, other: &GasQueue) -> Vec<GasQueueItem> {
        self.items
            .iter()
            .filter(|item| {
                !other
                    .items
                    .iter()
                    .any(|o| o.nonce == item.nonce && o.identifier() == item.identifier())
            })
            .cloned()
            .collect()
    }

    /// Whether an item with this identifier is queued.
    pub fn contains(&self, identifier: &TransactionIdentifier) -> bool {
        self.items.iter().any(|item| item.identifier() == identifier)
    }

    /// Whether the queue is at capacity.
    pub fn depth_reached(&self) -> bool {
        self.items.len() >= self.max_queue_depth
    }

    /// The lowest-nonce item, next in line to be mined.
    pub fn head(&self) -> Option<&GasQueueItem> {
        self.items.first()
    }

    /// All queued items, nonce ascending.
    pub fn items(&self) -> &[GasQueueItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// The next unused nonce.
    pub fn empty_nonce(&self) -> u64 {
        self.empty_nonce
    }

    pub fn replacement_rate_percent(&self) -> u64 {
        self.replacement_rate_percent
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes, B256};
    use pisa_primitives::AppointmentId;

    use super::*;

    fn make_request(id: u8, ideal: u64) -> GasQueueItemRequest {
        let identifier = TransactionIdentifier {
            chain_id: 1,
            data: Bytes::copy_from_slice(&[id]),
            to: Address::repeat_byte(0xaa),
            value: U256::ZERO,
            gas_limit: 200_000,
        };
        GasQueueItemRequest::new(
            AppointmentId(B256::repeat_byte(id)),
            identifier,
            U256::from(ideal),
            Bytes::copy_from_slice(&[id]),
        )
    }

    fn gas(queue: &GasQueue, index: usize) -> u64 {
        queue.items()[index].nonce_gas_price.to::<u64>()
    }

    fn ids(queue: &GasQueue) -> Vec<u8> {
        queue
            .items()
            .iter()
            .map(|item| item.request.response_data[0])
            .collect()
    }

    #[test]
    fn test_add_appends_lowest_price_at_empty_nonce() {
        let queue = GasQueue::new(0, 15, 5);

        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();

        assert_eq!(ids(&queue), vec![1, 2]);
        assert_eq!(queue.items()[0].nonce, 0);
        assert_eq!(queue.items()[1].nonce, 1);
        assert_eq!(gas(&queue, 0), 100);
        assert_eq!(gas(&queue, 1), 90);
        assert_eq!(queue.empty_nonce(), 2);
    }

    #[test]
    fn test_add_inserts_and_shifts_with_bumps() {
        // [(a1, 100, n0), (a2, 90, n1)] + a3 at 110.
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();

        let queue = queue.add(make_request(3, 110)).unwrap();

        assert_eq!(ids(&queue), vec![3, 1, 2]);
        // a3 takes over nonce 0 and must out-bid a1's pending tx at 100.
        assert_eq!(gas(&queue, 0), 115);
        // a1 moves to nonce 1 carrying its own bump: ceil(100 * 1.15).
        assert_eq!(gas(&queue, 1), 115);
        // a2 moves to nonce 2: ceil(90 * 1.15) = 104.
        assert_eq!(gas(&queue, 2), 104);
        assert_eq!(queue.empty_nonce(), 3);
    }

    #[test]
    fn test_add_shifted_price_floors_at_ideal() {
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 200)).unwrap();

        // a2 out-bids a1: a2 at n0 pays max(bump(100), 200) = 200.
        assert_eq!(ids(&queue), vec![2, 1]);
        assert_eq!(gas(&queue, 0), 200);
        assert_eq!(gas(&queue, 1), 115);
    }

    #[test]
    fn test_add_depth_reached() {
        let queue = GasQueue::new(0, 15, 2);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();

        let result = queue.add(make_request(3, 80));

        assert_eq!(result, Err(GasQueueError::DepthReached(2)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_add_duplicate_identifier() {
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();

        let result = queue.add(make_request(1, 120));

        assert!(matches!(result, Err(GasQueueError::DuplicateIdentifier(_))));
    }

    #[test]
    fn test_dequeue_drops_head_only() {
        let queue = GasQueue::new(5, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();

        let queue = queue.dequeue().unwrap();

        assert_eq!(ids(&queue), vec![2]);
        assert_eq!(queue.items()[0].nonce, 6);
        assert_eq!(gas(&queue, 0), 90);
        assert_eq!(queue.empty_nonce(), 7);
    }

    #[test]
    fn test_dequeue_empty() {
        let queue = GasQueue::new(0, 15, 5);
        assert_eq!(queue.dequeue(), Err(GasQueueError::Empty));
    }

    #[test]
    fn test_consume_mid_queue_shifts_lower_items() {
        // [(a1, n0), (a2, n1), (a3, n2)]; a2 mined off-head.
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();
        let queue = queue.add(make_request(3, 80)).unwrap();

        let queue = queue.consume(&make_request(2, 90).identifier).unwrap();

        assert_eq!(ids(&queue), vec![1, 3]);
        assert_eq!(queue.items()[0].nonce, 1);
        assert_eq!(queue.items()[1].nonce, 2);
        // a1 was re-priced for its new slot, a3 untouched.
        assert_eq!(gas(&queue, 0), 115);
        assert_eq!(gas(&queue, 1), 80);
        assert_eq!(queue.empty_nonce(), 3);
    }

    #[test]
    fn test_consume_unknown_identifier() {
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();

        let result = queue.consume(&make_request(9, 1).identifier);

        assert!(matches!(result, Err(GasQueueError::UnknownIdentifier(_))));
    }

    #[test]
    fn test_add_then_consume_restores_identifier_set() {
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();

        let added = queue.add(make_request(3, 110)).unwrap();
        let restored = added.consume(&make_request(3, 110).identifier).unwrap();

        assert_eq!(ids(&restored), ids(&queue));
        assert_eq!(restored.len(), queue.len());
        // Adding consumed a nonce permanently.
        assert_eq!(restored.empty_nonce(), queue.empty_nonce() + 1);
    }

    #[test]
    fn test_prepend_in_order_keeps_prices() {
        // Queue occupies n2..; re-introduce a higher-priced item at n1.
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();
        let queue = queue.dequeue().unwrap().dequeue().unwrap();
        let queue = queue.add(make_request(3, 80)).unwrap();

        let returning = GasQueueItem::new(make_request(2, 90), U256::from(90u64), 1);
        let queue = queue.prepend(vec![returning]).unwrap();

        assert_eq!(ids(&queue), vec![2, 3]);
        assert_eq!(queue.items()[0].nonce, 1);
        assert_eq!(gas(&queue, 0), 90);
        assert_eq!(gas(&queue, 1), 80);
    }

    #[test]
    fn test_prepend_reorders_when_price_order_disagrees() {
        // Re-introduced item prices below the current head, so the requests
        // must swap slots and both slots get re-priced.
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 50)).unwrap();
        let queue = queue.dequeue().unwrap();
        let queue = queue.add(make_request(2, 100)).unwrap();
        assert_eq!(queue.items()[0].nonce, 1);

        let returning = GasQueueItem::new(make_request(1, 50), U256::from(50u64), 0);
        let queue = queue.prepend(vec![returning]).unwrap();

        assert_eq!(ids(&queue), vec![2, 1]);
        assert_eq!(queue.items()[0].nonce, 0);
        assert_eq!(queue.items()[1].nonce, 1);
        // a2 must out-bid a1's old tx at nonce 0: max(ceil(50 * 1.15), 100, 100).
        assert_eq!(gas(&queue, 0), 100);
        // a1 must out-bid a2's old tx at nonce 1: max(ceil(100 * 1.15), 50, 50).
        assert_eq!(gas(&queue, 1), 115);
    }

    #[test]
    fn test_prepend_rejects_overlapping_nonces() {
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();

        let overlapping = GasQueueItem::new(make_request(2, 90), U256::from(90u64), 0);
        let result = queue.prepend(vec![overlapping]);

        assert_eq!(result, Err(GasQueueError::OverlappingNonces));
    }

    #[test]
    fn test_prepend_rejects_gap() {
        let queue = GasQueue::new(5, 15, 5).add(make_request(3, 80)).unwrap();

        // Re-introducing at nonce 2 would leave nonces 3 and 4 unfilled.
        let distant = GasQueueItem::new(make_request(4, 100), U256::from(100u64), 2);
        let result = queue.prepend(vec![distant]);

        assert!(matches!(result, Err(GasQueueError::Invalid(_))));
    }

    #[test]
    fn test_prepend_depth_limit() {
        let queue = GasQueue::new(5, 15, 1).add(make_request(1, 100)).unwrap();

        let returning = GasQueueItem::new(make_request(2, 90), U256::from(90u64), 4);
        let result = queue.prepend(vec![returning]);

        assert_eq!(result, Err(GasQueueError::DepthReached(1)));
    }

    #[test]
    fn test_difference_returns_new_and_moved_items() {
        let queue = GasQueue::new(0, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();

        let bumped = queue.add(make_request(3, 110)).unwrap();
        let diff = bumped.difference(&queue);

        // Every slot changed: the insert plus two shifted items.
        assert_eq!(diff.len(), 3);
        let old_diff = queue.difference(&bumped);
        // Antisymmetry: nothing appears on both sides.
        for item in &old_diff {
            assert!(!diff
                .iter()
                .any(|d| d.nonce == item.nonce && d.identifier() == item.identifier()));
        }
    }

    #[test]
    fn test_difference_of_identical_queues_is_empty() {
        let queue = GasQueue::new(0, 15, 5).add(make_request(1, 100)).unwrap();
        assert!(queue.difference(&queue.clone()).is_empty());
    }

    #[test]
    fn test_from_parts_rejects_corrupt_queues() {
        let item_a = GasQueueItem::new(make_request(1, 100), U256::from(100u64), 0);
        let item_b = GasQueueItem::new(make_request(2, 110), U256::from(110u64), 1);

        // Ascending ideal prices violate the priority order.
        let result = GasQueue::from_parts(vec![item_a.clone(), item_b], 2, 15, 5);
        assert!(matches!(result, Err(GasQueueError::Invalid(_))));

        // Empty nonce must follow the last item.
        let result = GasQueue::from_parts(vec![item_a], 5, 15, 5);
        assert!(matches!(result, Err(GasQueueError::Invalid(_))));
    }

    #[test]
    fn test_serialization_round_trips() {
        let queue = GasQueue::new(3, 15, 5);
        let queue = queue.add(make_request(1, 100)).unwrap();
        let queue = queue.add(make_request(2, 90)).unwrap();
        let queue = queue.add(make_request(3, 110)).unwrap();

        let bytes = bincode::serialize(&queue).unwrap();
        let restored: GasQueue = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, queue);

        let json = serde_json::to_string(&queue).unwrap();
        let restored: GasQueue = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, queue);
    }
}
