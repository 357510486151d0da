//! # Pancake Ledger Core
//!
//! Pure primitives for the Pancake ledger: packets, canonical JSON, hashing,
//! engagement ledgers (MEAL) and query descriptors.
//!
//! This crate contains no I/O, no storage, no networking. Every function is a
//! transformation over in-memory values.
//!
//! ## Key Types
//!
//! - [`Packet`] - An immutable, hash-sealed observation or message
//! - [`PacketBuilder`] - The packet factory
//! - [`Ledger`] / [`LedgerEntry`] - A hash-chained, multi-participant log
//! - [`PacketQuery`] / [`Page`] - Filtered, cursor-paginated scans
//!
//! ## Canonicalization
//!
//! Everything that is hashed is first encoded as canonical JSON
//! ([`CANONICAL_FORM`]). See the [`canonical`] module.

pub mod canonical;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod packet;
pub mod query;
pub mod types;
pub mod validation;

pub use canonical::{canonical_len, canonical_string, canonicalize, CANONICAL_FORM};
pub use error::{ChainBreak, ChainViolation, LedgerError, ValidationError};
pub use hash::{content_hash, content_hash_with, packet_hash, sha256, Digest, HashAlgorithm};
pub use ledger::{
    verify_chain, AgentKind, Author, ChainSummary, EntryDraft, EntryKind, Ledger, LedgerCounters,
    LedgerEntry, LedgerStatus, LinkedSource, Location, NewLedger, Participant,
};
pub use packet::{Packet, PacketBuilder, PacketFooter, PacketHeader, ENC_NONE, TAG_TRUNCATED};
pub use query::{Page, PacketQuery, SortKey, DEFAULT_LIMIT};
pub use types::{format_timestamp, parse_timestamp, EntryId, GeoId, LedgerId, PacketId};
pub use validation::{
    truncate_text, validate_packet, validate_size, validate_structure, validate_structure_within,
    DEFAULT_MAX_BODY_BYTES,
};
