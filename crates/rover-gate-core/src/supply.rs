//! NRG supply derived from chain height.

/// Supply at the genesis block.
pub const BASE_SUPPLY: u64 = 28_787_582;

/// NRG emitted by every block after genesis.
pub const EMISSION_PER_BLOCK: u64 = 2;

/// Circulating supply once the chain has reached `latest_height`.
///
/// Genesis is height 1. A height of 0 is treated as genesis.
pub fn nrg_supply(latest_height: u64) -> u128 {
    let emitted_blocks = latest_height.saturating_sub(1) as u128;
    BASE_SUPPLY as u128 + emitted_blocks * EMISSION_PER_BLOCK as u128
}
