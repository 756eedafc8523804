//! Gas price estimation for new responses.

use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use pisa_chain::{ChainClient, ChainClientError};
use pisa_primitives::ResponseData;

/// Chooses the ideal gas price for a response.
#[async_trait]
pub trait GasEstimator: Send + Sync + 'static {
    /// The minimum price at which this response wants to be mined.
    async fn estimate(&self, response_data: &ResponseData) -> Result<U256, ChainClientError>;
}

/// Estimator deferring to the node's current gas price.
#[derive(Debug)]
pub struct ChainGasEstimator<C> {
    client: Arc<C>,
}

impl<C> ChainGasEstimator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: ChainClient> GasEstimator for ChainGasEstimator<C> {
    async fn estimate(&self, _response_data: &ResponseData) -> Result<U256, ChainClientError> {
        self.client.gas_price().await
    }
}
