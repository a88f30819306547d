//! Golden vectors for the NRG supply schedule.

use rover_gate_core::nrg_supply;

/// Supply at a known latest-block height.
#[derive(Debug, Clone)]
pub struct SupplyVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Latest local block height.
    pub height: u64,
    /// Expected amount as a decimal string.
    pub expected_amount: &'static str,
}

/// Get all supply vectors.
pub fn all_supply_vectors() -> Vec<SupplyVector> {
    vec![
        SupplyVector {
            name: "genesis",
            height: 1,
            expected_amount: "28787582",
        },
        SupplyVector {
            name: "second block",
            height: 2,
            expected_amount: "28787584",
        },
        SupplyVector {
            name: "block 1000",
            height: 1000,
            expected_amount: "28789580",
        },
        SupplyVector {
            name: "height zero clamps to base",
            height: 0,
            expected_amount: "28787582",
        },
        SupplyVector {
            name: "max height",
            height: u64::MAX,
            expected_amount: "36893488147447890810",
        },
    ]
}

/// Compute every vector. Returns (name, matches, computed amount).
pub fn verify_supply_vectors() -> Vec<(String, bool, String)> {
    all_supply_vectors()
        .iter()
        .map(|v| {
            let amount = nrg_supply(v.height).to_string();
            (v.name.to_string(), amount == v.expected_amount, amount)
        })
        .collect()
}
