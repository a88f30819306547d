//! NRG supply from the latest block height.

use std::sync::Arc;

use rover_gate_core::{nrg_supply, LATEST_BLOCK_KEY};
use rover_gate_store::{Store, StoreExt};
use tracing::debug;

use crate::error::{GateError, Result};

/// Reads the latest block height and applies the emission schedule.
///
/// The latest block is always read from `bc.block.latest`; the configured
/// namespace only scopes the miner mutex.
pub struct SupplyReader<S: Store> {
    store: Arc<S>,
}

impl<S: Store> SupplyReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Current circulating supply.
    ///
    /// `NotFound` before the first local block. `StateRead` if the latest
    /// height cannot be read or parsed.
    pub async fn current_supply(&self) -> Result<u128> {
        let height = self
            .store
            .latest_block_height()
            .await
            .map_err(|e| GateError::StateRead(e.to_string()))?
            .ok_or_else(|| GateError::NotFound(LATEST_BLOCK_KEY.to_string()))?;

        let supply = nrg_supply(height);
        debug!(height, %supply, "computed nrg supply");
        Ok(supply)
    }
}
