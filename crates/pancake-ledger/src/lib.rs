//! # Pancake Ledger
//!
//! The unified API for the Pancake ledger: verifiable field records through
//! packets, engagement ledgers and a geo-indexed query engine.
//!
//! ## Overview
//!
//! The Pancake Ledger provides a storage-agnostic library for:
//!
//! - **Packets**: Immutable, self-hashing records of observations and messages
//! - **Ledgers**: Append-only, hash-chained conversations about one topic
//! - **Queries**: Geo-indexed, cursor-paginated retrieval and message search
//! - **Export**: A newline-delimited triple projection of stored packets
//!
//! ## Key Concepts
//!
//! - **Packet**: Immutable. Never edited. Corrections are new packets.
//! - **GeoID**: Resolved once per intake by an external [`GeoResolver`].
//! - **Entry**: One link in a ledger chain, either content or a reference.
//! - **Revision**: Ledger roots are written under optimistic concurrency.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pancake_ledger::{CaptureLocation, Kernel, KernelConfig, ScoutingReport, UnconfiguredResolver};
//! use pancake_ledger::store::SqliteStore;
//!
//! async fn example() {
//!     // Open storage
//!     let store = SqliteStore::open("pancake.db").unwrap();
//!
//!     // Create the kernel with a real resolver in production
//!     let kernel = Kernel::new(store, UnconfiguredResolver, KernelConfig::default());
//!
//!     // Record an observation
//!     let report = ScoutingReport::new(CaptureLocation::point(41.59, -93.62), "aphids");
//!     let packet = kernel.intake_scouting(report).await.unwrap();
//!
//!     // Read it back
//!     let stored = kernel.get_packet(&packet.id()).await.unwrap();
//!     assert_eq!(stored, Some(packet));
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `pancake_ledger::core` - Core primitives (Packet, Ledger, hashing, etc.)
//! - `pancake_ledger::store` - Storage abstraction and SQLite

pub mod config;
pub mod error;
pub mod geo;
pub mod graph;
pub mod intake;
pub mod kernel;

// Re-export component crates
pub use pancake_ledger_core as core;
pub use pancake_ledger_store as store;

// Re-export main types for convenience
pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use geo::{CaptureLocation, CollaboratorError, GeoResolver, UnconfiguredResolver};
pub use graph::{packet_triples, Triple};
pub use intake::{ChatMessage, IntakeRequest, ScoutingReport};
pub use kernel::{IngestResult, Kernel, MessageSearch, TYPE_CHAT_MESSAGE, TYPE_NOTE};

// Re-export commonly used core types
pub use pancake_ledger_core::{
    AgentKind, Author, Digest, EntryDraft, EntryKind, GeoId, HashAlgorithm, Ledger, LedgerEntry,
    LedgerId, LinkedSource, Location, NewLedger, Packet, PacketId, PacketQuery, Page,
};
