//! # Rover Gate Testkit
//!
//! Testing utilities for the rover gate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: NRG supply at known heights
//! - **Generators**: Proptest strategies for rovers, arrivals and ledgers
//! - **Fixtures**: A memory-backed gate and a scripted admission source
//!
//! ## Golden Vectors
//!
//! ```rust
//! use rover_gate_testkit::vectors::verify_supply_vectors;
//!
//! for (name, ok, amount) in verify_supply_vectors() {
//!     assert!(ok, "{}: got {}", name, amount);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use rover_gate_testkit::generators::arrivals;
//!
//! proptest! {
//!     #[test]
//!     fn replay_keeps_order(arrivals in arrivals(4, 32)) {
//!         // buffer under `pending`, release, replay, compare per rover
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use rover_gate_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let announcement = fixture.announcement("eth", 1);
//! assert_eq!(announcement.height, 1);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{ScriptedAdmissionSource, ScriptedRead, TestFixture};
pub use generators::{Arrival, LedgerScenario};
pub use vectors::{all_supply_vectors, verify_supply_vectors, SupplyVector};
