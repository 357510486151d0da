//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical encoding and the packet and entry hash
//! formulas. Any other implementation must reproduce the same digests.

use chrono::{TimeZone, Utc};
use pancake_ledger_core::{
    packet_hash, validate_structure, AgentKind, Author, Digest, EntryId, EntryKind, HashAlgorithm,
    LedgerEntry, LedgerId, Packet,
};
use serde_json::{json, Value};

/// A golden packet vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub header: Value,
    pub body: Value,
    /// Expected `Footer.hash` (hex).
    pub expected_hash: &'static str,
}

impl GoldenVector {
    /// The full wire document, footer included.
    pub fn raw_packet(&self) -> Value {
        json!({
            "Header": self.header,
            "Body": self.body,
            "Footer": {"hash": self.expected_hash, "enc": "none"},
        })
    }

    /// Decode the wire document through the validator.
    pub fn packet(&self) -> Packet {
        validate_structure(&self.raw_packet()).unwrap_or_else(|e| panic!("{}: {}", self.name, e))
    }
}

/// Get all golden packet vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "minimal note",
            header: json!({
                "id": "01J9Z8Y7X6W5V4T3S2R1Q0P9N8",
                "geoid": "geo-field-a",
                "timestamp": "2024-05-01T12:00:00.000Z",
                "type": "note",
            }),
            body: json!({"message": "hello", "attachments": []}),
            expected_hash: "3a4d0dd919ab16c8a8315ca2c9512f0d7852b276d29733c56618b2efcb926fbc",
        },
        GoldenVector {
            name: "chat message with predecessor and non-ASCII text",
            header: json!({
                "id": "01J9Z8Y7X6W5V4T3S2R1Q0P9N9",
                "geoid": "geo-field-b",
                "timestamp": "2024-05-01T12:05:30.250Z",
                "type": "chat_message",
                "prev": "01J9Z8Y7X6W5V4T3S2R1Q0P9N8",
            }),
            body: json!({"text": "café ☕ «ok»", "thread_id": "thread-7", "attachments": []}),
            expected_hash: "e067d478d4d38482d61bc0774d3b0fcfbe97ce8bc3cea79c4a4c9122515c3df2",
        },
        GoldenVector {
            name: "tenant header, mixed scalars, escapes",
            header: json!({
                "id": "01J9Z8Y7X6W5V4T3S2R1Q0P9NA",
                "geoid": "geo-field-c",
                "timestamp": "2024-05-02T08:00:00.000Z",
                "type": "observation",
                "tenant": {"org": "acme", "region": "north"},
            }),
            body: json!({
                "readings": [1, 2.5, -3, true, null],
                "nested": {"z": "last", "a": "first"},
                "note": "line1\nline2\t\"q\"",
            }),
            expected_hash: "ac003424cbe097377d661cbb94c33dfb0610af21cbaa749335aecd34a334e2bc",
        },
    ]
}

/// The first entry of a field-visit ledger, with its content hash filled in.
///
/// Expected hashes are [`ENTRY_CONTENT_HASH`] and [`ENTRY_HASH`].
pub fn golden_entry() -> LedgerEntry {
    let payload = json!({"text": "Starting field inspection"});
    let mut entry = LedgerEntry {
        entry_id: EntryId::from_string("01J9Z8Y7X6W5V4T3S2R1Q0P9NB").expect("valid ulid"),
        ledger_id: LedgerId::from_string("01J9Z8Y7X6W5V4T3S2R1Q0P9NC").expect("valid ulid"),
        kind: EntryKind::Content,
        sequence_number: 1,
        previous_hash: None,
        previous_entry_id: None,
        time_index: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        author: Author::new("user-ana", AgentKind::Human).with_name("Ana"),
        payload,
        content_hash: Digest::from_bytes([0u8; 32]),
        entry_hash: Digest::from_bytes([0u8; 32]),
    };
    entry.content_hash = entry.compute_content_hash(HashAlgorithm::Sha256);
    entry.entry_hash = entry.compute_entry_hash(HashAlgorithm::Sha256);
    entry
}

pub const ENTRY_CONTENT_HASH: &str =
    "ff885bf8d1b2af6a2db6e6249b12e338304eacdb5ec467bac2d8d9c0703ef975";
pub const ENTRY_HASH: &str = "a33a44b67119a06161e14b5a3fc5f2be3edcaee85679404418839b2125f1c867";

/// Recompute every packet vector.
///
/// Returns `(name, matches, computed hash)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = packet_hash(&v.header, &v.body).to_hex();
            (v.name.to_string(), hex == v.expected_hash, hex)
        })
        .collect()
}
