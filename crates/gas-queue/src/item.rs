//! Queue items and the requests they are built from.

use alloy_primitives::{Bytes, U256};
use pisa_primitives::{AppointmentId, TransactionFields, TransactionIdentifier};
use serde::{Deserialize, Serialize};

/// A request to have a response transaction mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasQueueItemRequest {
    /// The appointment this response serves.
    pub appointment_id: AppointmentId,
    /// Fingerprint the broadcast transaction will carry.
    pub identifier: TransactionIdentifier,
    /// Minimum price at which this item wants to be mined, in wei.
    pub ideal_gas_price: U256,
    /// Opaque response payload recorded alongside the request.
    pub response_data: Bytes,
}

impl GasQueueItemRequest {
    /// Creates a request for a response at the given ideal price.
    pub fn new(
        appointment_id: AppointmentId,
        identifier: TransactionIdentifier,
        ideal_gas_price: U256,
        response_data: Bytes,
    ) -> Self {
        Self {
            appointment_id,
            identifier,
            ideal_gas_price,
            response_data,
        }
    }
}

/// A request assigned to a nonce slot at a concrete submission price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasQueueItem {
    /// The underlying request.
    pub request: GasQueueItemRequest,
    /// Price the transaction is currently submitted at. Never below
    /// `ideal_gas_price`; bumped by the replacement rate when the item is
    /// shifted between nonce slots.
    pub nonce_gas_price: U256,
    /// Mirror of `request.ideal_gas_price`, kept for ordering.
    pub ideal_gas_price: U256,
    /// Nonce slot the item occupies.
    pub nonce: u64,
}

impl GasQueueItem {
    /// Places a request at a nonce slot with the given submission price.
    ///
    /// # Panics
    ///
    /// Panics if the submission price undercuts the request's ideal price;
    /// such an item could never be mined at an acceptable price.
    pub fn new(request: GasQueueItemRequest, nonce_gas_price: U256, nonce: u64) -> Self {
        assert!(
            nonce_gas_price >= request.ideal_gas_price,
            "nonce gas price {nonce_gas_price} below ideal {}",
            request.ideal_gas_price
        );
        let ideal_gas_price = request.ideal_gas_price;
        Self {
            request,
            nonce_gas_price,
            ideal_gas_price,
            nonce,
        }
    }

    /// The fingerprint of this item's transaction.
    pub fn identifier(&self) -> &TransactionIdentifier {
        &self.request.identifier
    }

    /// The appointment this item serves.
    pub fn appointment_id(&self) -> AppointmentId {
        self.request.appointment_id
    }

    /// Unsigned transaction fields for this item at its current price.
    pub fn transaction_fields(&self) -> TransactionFields {
        let identifier = &self.request.identifier;
        TransactionFields {
            to: identifier.to,
            data: identifier.data.clone(),
            value: identifier.value,
            gas_limit: identifier.gas_limit,
            gas_price: self.nonce_gas_price,
            nonce: self.nonce,
            chain_id: identifier.chain_id,
        }
    }
}
