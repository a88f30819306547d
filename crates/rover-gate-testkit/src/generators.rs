//! Proptest generators for property-based testing.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use rover_gate_core::{AdmissionState, BlockAnnouncement, RoverId, TxRef};

/// Generate an admission state.
pub fn admission_state() -> impl Strategy<Value = AdmissionState> {
    prop_oneof![
        Just(AdmissionState::Closed),
        Just(AdmissionState::Open),
        Just(AdmissionState::Pending),
    ]
}

/// Generate a rover name.
pub fn rover_name() -> impl Strategy<Value = String> {
    "[a-z]{2,5}".prop_map(String::from)
}

/// Generate a rover id.
pub fn rover_id() -> impl Strategy<Value = RoverId> {
    rover_name().prop_map(RoverId::from)
}

/// Generate a transaction reference.
pub fn tx_ref() -> impl Strategy<Value = TxRef> {
    "tx-[0-9a-f]{1,8}".prop_map(TxRef::from)
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// One block arriving from a rover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub rover: String,
    pub height: u64,
}

impl Arrival {
    pub fn announcement(&self) -> BlockAnnouncement {
        BlockAnnouncement::new(
            self.rover.as_str(),
            format!("{}:{}", self.rover, self.height),
            self.height,
            self.height.to_le_bytes().to_vec(),
        )
    }
}

/// Generate an interleaved arrival sequence over up to `max_rovers` rovers.
///
/// Heights are unique within the sequence, so no two arrivals are
/// identical. Heights are not sorted per rover.
pub fn arrivals(max_rovers: usize, max_len: usize) -> impl Strategy<Value = Vec<Arrival>> {
    let rovers = max_rovers.max(1);
    prop::collection::vec((0..rovers, any::<u32>()), 0..=max_len).prop_map(|picks| {
        picks
            .into_iter()
            .enumerate()
            .map(|(i, (rover, salt))| Arrival {
                rover: format!("rover{}", rover),
                height: ((salt as u64) << 16) | i as u64,
            })
            .collect()
    })
}

/// Arrival order per rover.
pub fn per_rover_order(arrivals: &[Arrival]) -> BTreeMap<String, Vec<u64>> {
    let mut order: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for a in arrivals {
        order.entry(a.rover.clone()).or_default().push(a.height);
    }
    order
}

/// A ledger with blocks on one branch, tracked transactions, and a
/// candidate set that mixes tracked and untracked references.
#[derive(Debug, Clone)]
pub struct LedgerScenario {
    /// Block hash and height, ascending by height.
    pub blocks: Vec<(String, u64)>,
    /// Tracked transaction and the height it settles at.
    pub tracked: Vec<(TxRef, u64)>,
    pub candidates: BTreeSet<TxRef>,
}

impl Arbitrary for LedgerScenario {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            prop::collection::btree_set(1u64..=500, 1..=8),
            prop::collection::btree_map(tx_ref(), 1u64..=500, 0..=16),
            prop::collection::btree_set(tx_ref(), 0..=8),
        )
            .prop_map(|(heights, tracked, extra)| {
                let blocks = heights
                    .into_iter()
                    .map(|h| (format!("block-{}", h), h))
                    .collect();
                let mut candidates: BTreeSet<TxRef> = tracked.keys().cloned().collect();
                candidates.extend(extra);
                LedgerScenario {
                    blocks,
                    tracked: tracked.into_iter().collect(),
                    candidates,
                }
            })
            .boxed()
    }
}
