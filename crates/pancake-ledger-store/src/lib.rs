//! # Pancake Ledger Store
//!
//! Storage abstraction for the Pancake ledger. Provides a trait-based interface
//! for packet and ledger persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts storage behind the [`Store`] trait, allowing the
//! kernel to be storage-agnostic. The primary implementation is
//! [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a packet
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pancake_ledger_store::{SqliteStore, Store, InsertResult};
//! use pancake_ledger_core::{GeoId, PacketBuilder};
//! use serde_json::json;
//!
//! async fn example() {
//!     let store = SqliteStore::open("pancake.db").unwrap();
//!
//!     let packet = PacketBuilder::new("note", GeoId::new("geo-a"), json!({"message": "hi"}))
//!         .build();
//!     let result = store.insert_packet(&packet, &[]).await.unwrap();
//!     assert_eq!(result, InsertResult::Inserted);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Inserting the same packet twice returns `AlreadyExists`
//! - **Secondary index**: Extra geoids are written in the packet's transaction
//! - **Optimistic concurrency**: Ledger updates carry the revision they were based on

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod conformance;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store, StoreExt};
