//! # Pancake Ledger Testkit
//!
//! Testing utilities for the Pancake ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known packets and entries with expected digests
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A ready kernel over a memory store and a fixed resolver
//!
//! ## Golden Vectors
//!
//! Golden vectors pin the canonical encoding across implementations:
//!
//! ```rust
//! use pancake_ledger_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, hash) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, hash);
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use pancake_ledger_testkit::generators::{packet_from_params, PacketParams};
//!
//! proptest! {
//!     #[test]
//!     fn packet_hash_is_deterministic(params: PacketParams) {
//!         let p1 = packet_from_params(&params);
//!         let p2 = packet_from_params(&params);
//!         prop_assert_eq!(p1.footer.hash, p2.footer.hash);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,ignore
//! use pancake_ledger_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let packet = fixture.note("aphids on the north edge").await;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    packet_at, FailingResolver, FixedGeoResolver, StalledResolver, TestFixture, TestKernel,
    FIELD_GEOID,
};
pub use generators::{packet_from_params, PacketParams};
pub use vectors::{all_vectors, golden_entry, verify_all_vectors, GoldenVector};
