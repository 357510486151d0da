//! Ledger: an append-only, multi-participant, hash-chained log (MEAL).
//!
//! A ledger root owns an ordered sequence of entries. Each entry commits to
//! its predecessor through `previous_hash`, so rewriting any historical entry
//! changes every hash after it.
//!
//! State machine: `Active -> Archived`. Archived ledgers reject appends.
//!
//! Everything here is pure. Persisting a root together with its new entry
//! in one atomic unit is the store's job.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canonical::canonicalize;
use crate::error::{ChainBreak, ChainViolation, LedgerError};
use crate::hash::{Digest, HashAlgorithm};
use crate::types::{format_timestamp, EntryId, GeoId, LedgerId};

/// Lifecycle status of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Active,
    /// Terminal. No further appends.
    Archived,
}

/// The kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Free-form content (a message, a note).
    Content,
    /// A pointer to an external record such as a stored packet.
    Reference,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Reference => "reference",
        }
    }
}

/// Whether a participant is a person or an automated agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Human,
    Ai,
}

impl AgentKind {
    /// Infer the kind from an agent identifier: `user-*` ids are people,
    /// everything else is an agent.
    pub fn infer(agent_id: &str) -> Self {
        if agent_id.starts_with("user-") {
            Self::Human
        } else {
            Self::Ai
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }
}

/// The author of an entry. Covered by the entry hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub agent_id: String,
    pub agent_kind: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Author {
    pub fn new(agent_id: impl Into<String>, agent_kind: AgentKind) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_kind,
            name: None,
        }
    }

    /// An author whose kind is inferred from the id.
    pub fn inferred(agent_id: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        let agent_kind = AgentKind::infer(&agent_id);
        Self::new(agent_id, agent_kind)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn to_value(&self) -> Value {
        let mut value = json!({
            "agent_id": self.agent_id,
            "agent_kind": self.agent_kind.as_str(),
        });
        if let Some(name) = &self.name {
            value["name"] = Value::String(name.clone());
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub agent_id: String,
    pub kind: AgentKind,
    pub joined_at: DateTime<Utc>,
}

/// Primary location of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub geoid: GeoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Location {
    pub fn new(geoid: impl Into<GeoId>) -> Self {
        Self {
            geoid: geoid.into(),
            label: None,
        }
    }

    pub fn labeled(geoid: impl Into<GeoId>, label: impl Into<String>) -> Self {
        Self {
            geoid: geoid.into(),
            label: Some(label.into()),
        }
    }
}

/// External data correlated with a ledger (e.g. weather or imagery for the
/// same field and period).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedSource {
    pub source_type: String,
    pub geoid: GeoId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Aggregate counters. Always equal to what was actually appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounters {
    pub packet_count: u64,
    pub content_count: u64,
    pub reference_count: u64,
    pub first_entry_id: Option<EntryId>,
    pub last_entry_id: Option<EntryId>,
}

/// Summary of the hash chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    /// Hash of entry #1.
    pub root_hash: Option<Digest>,
    /// Hash of the most recent entry.
    pub last_hash: Option<Digest>,
    pub algorithm: HashAlgorithm,
}

/// The root record of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub ledger_id: LedgerId,
    pub ledger_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub primary_location: Location,
    pub location_context: Vec<GeoId>,
    pub participants: Vec<Participant>,
    pub topics: Vec<String>,
    pub linked_sources: Vec<LinkedSource>,
    pub counters: LedgerCounters,
    pub chain: ChainSummary,
    pub status: LedgerStatus,
    /// Bumped on every mutation. Stores use it for optimistic concurrency.
    pub revision: u64,
}

/// Input for one new entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub kind: EntryKind,
    pub author: Author,
    pub payload: Value,
}

impl EntryDraft {
    pub fn content(author: Author, payload: Value) -> Self {
        Self {
            kind: EntryKind::Content,
            author,
            payload,
        }
    }

    pub fn reference(author: Author, payload: Value) -> Self {
        Self {
            kind: EntryKind::Reference,
            author,
            payload,
        }
    }
}

/// One link in a ledger's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub ledger_id: LedgerId,
    pub kind: EntryKind,
    /// 1-based, strictly increasing, no gaps.
    pub sequence_number: u64,
    /// Hash of the preceding entry (`None` for entry #1).
    pub previous_hash: Option<Digest>,
    /// Id of the preceding entry (`None` for entry #1).
    pub previous_entry_id: Option<EntryId>,
    pub time_index: DateTime<Utc>,
    pub author: Author,
    pub payload: Value,
    pub content_hash: Digest,
    pub entry_hash: Digest,
}

impl LedgerEntry {
    /// The record hashed into `entry_hash`.
    ///
    /// Covers `entry_id`, `ledger_id`, `sequence_number`, `time_index`,
    /// `author`, `content_hash` and `previous_hash` (empty string for the
    /// first entry).
    pub fn hash_input(&self) -> Value {
        json!({
            "entry_id": self.entry_id.to_string(),
            "ledger_id": self.ledger_id.to_string(),
            "sequence_number": self.sequence_number,
            "time_index": format_timestamp(self.time_index),
            "author": self.author.to_value(),
            "content_hash": self.content_hash.to_hex(),
            "previous_hash": self.previous_hash.map(|h| h.to_hex()).unwrap_or_default(),
        })
    }

    pub fn compute_entry_hash(&self, algorithm: HashAlgorithm) -> Digest {
        algorithm.digest(&canonicalize(&self.hash_input()))
    }

    pub fn compute_content_hash(&self, algorithm: HashAlgorithm) -> Digest {
        algorithm.digest(&canonicalize(&self.payload))
    }
}

/// Parameters for creating a ledger.
#[derive(Debug, Clone)]
pub struct NewLedger {
    pub ledger_type: String,
    pub primary_location: Location,
    pub participants: Vec<String>,
    pub topics: Vec<String>,
    pub location_context: Vec<GeoId>,
    pub first_entry: Option<EntryDraft>,
    pub algorithm: HashAlgorithm,
}

impl NewLedger {
    pub fn new(ledger_type: impl Into<String>, primary_location: Location) -> Self {
        Self {
            ledger_type: ledger_type.into(),
            primary_location,
            participants: Vec::new(),
            topics: Vec::new(),
            location_context: Vec::new(),
            first_entry: None,
            algorithm: HashAlgorithm::default(),
        }
    }

    pub fn participant(mut self, agent_id: impl Into<String>) -> Self {
        self.participants.push(agent_id.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    pub fn context(mut self, geoid: impl Into<GeoId>) -> Self {
        self.location_context.push(geoid.into());
        self
    }

    pub fn first_entry(mut self, draft: EntryDraft) -> Self {
        self.first_entry = Some(draft);
        self
    }

    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// A field-visit ledger opened by one person, optionally with an
    /// assistant agent and an opening message.
    pub fn field_visit(
        field: Location,
        user: Author,
        assistant: Option<&str>,
        initial_message: Option<&str>,
    ) -> Self {
        let mut new = Self::new("field_visit", field)
            .participant(user.agent_id.clone())
            .topic("field_inspection");
        if let Some(assistant) = assistant {
            new = new.participant(assistant);
        }
        if let Some(text) = initial_message {
            new = new.first_entry(EntryDraft::content(user, json!({ "text": text })));
        }
        new
    }

    /// A discussion ledger on one topic. The first participant authors the
    /// opening message, if any.
    pub fn discussion(
        topic: impl Into<String>,
        field: Location,
        participants: &[&str],
        assistant: Option<&str>,
        initial_message: Option<&str>,
    ) -> Self {
        let mut new = Self::new("discussion", field).topic(topic);
        for agent_id in participants {
            new = new.participant(*agent_id);
        }
        if let Some(assistant) = assistant {
            new = new.participant(assistant);
        }
        if let (Some(text), Some(first)) = (initial_message, participants.first()) {
            let author = Author::inferred(*first).with_name(*first);
            new = new.first_entry(EntryDraft::content(author, json!({ "text": text })));
        }
        new
    }
}

impl Ledger {
    /// Build a new ledger root, with its first entry if one was supplied.
    ///
    /// The first entry goes through the same path as [`Ledger::append`]:
    /// `sequence_number = 1`, no previous hash.
    pub fn create(new: NewLedger, now: DateTime<Utc>) -> (Ledger, Option<LedgerEntry>) {
        let mut ledger = Ledger {
            ledger_id: LedgerId::at(now),
            ledger_type: new.ledger_type,
            created_at: now,
            updated_at: now,
            primary_location: new.primary_location,
            location_context: new.location_context,
            participants: Vec::new(),
            topics: new.topics,
            linked_sources: Vec::new(),
            counters: LedgerCounters::default(),
            chain: ChainSummary {
                root_hash: None,
                last_hash: None,
                algorithm: new.algorithm,
            },
            status: LedgerStatus::Active,
            revision: 0,
        };

        for agent_id in new.participants {
            let kind = AgentKind::infer(&agent_id);
            ledger.add_participant(agent_id, kind, now);
        }

        let first = new.first_entry.map(|draft| ledger.push_entry(draft, now));
        ledger.revision = 0;
        (ledger, first)
    }

    pub fn is_archived(&self) -> bool {
        self.status == LedgerStatus::Archived
    }

    pub fn has_participant(&self, agent_id: &str) -> bool {
        self.participants.iter().any(|p| p.agent_id == agent_id)
    }

    /// Append an entry, updating counters and the chain summary.
    ///
    /// Fails with [`LedgerError::Archived`] on an archived ledger.
    pub fn append(
        &mut self,
        draft: EntryDraft,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if self.is_archived() {
            return Err(LedgerError::Archived(self.ledger_id));
        }
        Ok(self.push_entry(draft, now))
    }

    fn push_entry(&mut self, draft: EntryDraft, now: DateTime<Utc>) -> LedgerEntry {
        let algorithm = self.chain.algorithm;
        let sequence_number = self.counters.packet_count + 1;

        let mut entry = LedgerEntry {
            entry_id: EntryId::at(now),
            ledger_id: self.ledger_id,
            kind: draft.kind,
            sequence_number,
            previous_hash: self.chain.last_hash,
            previous_entry_id: self.counters.last_entry_id,
            // Hashed at millisecond precision, so store it that way too.
            time_index: now.trunc_subsecs(3),
            author: draft.author,
            content_hash: algorithm.digest(&canonicalize(&draft.payload)),
            payload: draft.payload,
            entry_hash: Digest::from_bytes([0u8; 32]),
        };
        entry.entry_hash = entry.compute_entry_hash(algorithm);

        self.counters.packet_count = sequence_number;
        match entry.kind {
            EntryKind::Content => self.counters.content_count += 1,
            EntryKind::Reference => self.counters.reference_count += 1,
        }
        if sequence_number == 1 {
            self.chain.root_hash = Some(entry.entry_hash);
            self.counters.first_entry_id = Some(entry.entry_id);
        }
        self.chain.last_hash = Some(entry.entry_hash);
        self.counters.last_entry_id = Some(entry.entry_id);
        self.touch(now);

        entry
    }

    /// Add a participant. Returns `false` (and changes nothing) if the agent
    /// is already present.
    pub fn add_participant(
        &mut self,
        agent_id: impl Into<String>,
        kind: AgentKind,
        now: DateTime<Utc>,
    ) -> bool {
        let agent_id = agent_id.into();
        if self.has_participant(&agent_id) {
            return false;
        }
        self.participants.push(Participant {
            agent_id,
            kind,
            joined_at: now,
        });
        self.touch(now);
        true
    }

    /// Record an external data source correlated with this ledger.
    pub fn link_source(&mut self, source: LinkedSource, now: DateTime<Utc>) {
        self.linked_sources.push(source);
        self.touch(now);
    }

    /// Archive the ledger. Returns `false` if it already was.
    pub fn archive(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_archived() {
            return false;
        }
        self.status = LedgerStatus::Archived;
        self.touch(now);
        true
    }

    /// Verify `entries` (in sequence order) against this root: the chain
    /// itself, then the counters and chain summary.
    pub fn verify_entries(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        verify_chain(entries, self.chain.algorithm)?;

        if let Some((index, entry)) = entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.ledger_id != self.ledger_id)
        {
            return Err(ChainViolation {
                index,
                sequence_number: entry.sequence_number,
                reason: ChainBreak::ForeignEntry {
                    expected: self.ledger_id,
                    found: entry.ledger_id,
                },
            }
            .into());
        }

        let count = entries.len() as u64;
        if self.counters.packet_count != count {
            return Err(LedgerError::SummaryMismatch(format!(
                "packet_count is {}, found {} entries",
                self.counters.packet_count, count
            )));
        }

        let content = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Content)
            .count() as u64;
        if self.counters.content_count != content
            || self.counters.reference_count != count - content
        {
            return Err(LedgerError::SummaryMismatch(format!(
                "kind counts are {}/{}, found {}/{}",
                self.counters.content_count,
                self.counters.reference_count,
                content,
                count - content
            )));
        }

        let first = entries.first();
        let last = entries.last();
        if self.chain.root_hash != first.map(|e| e.entry_hash) {
            return Err(LedgerError::SummaryMismatch("root_hash".into()));
        }
        if self.chain.last_hash != last.map(|e| e.entry_hash) {
            return Err(LedgerError::SummaryMismatch("last_hash".into()));
        }
        if self.counters.first_entry_id != first.map(|e| e.entry_id)
            || self.counters.last_entry_id != last.map(|e| e.entry_id)
        {
            return Err(LedgerError::SummaryMismatch("first/last entry id".into()));
        }

        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision += 1;
    }
}

/// Walk `entries` once, in sequence order, and report the first break.
///
/// Checks at each index `i`:
/// - `sequence_number == i + 1`
/// - all entries share one ledger
/// - `previous_hash` and `previous_entry_id` point at entry `i - 1`
/// - `content_hash` matches the payload
/// - `entry_hash` matches the recomputed hash
pub fn verify_chain(
    entries: &[LedgerEntry],
    algorithm: HashAlgorithm,
) -> Result<(), ChainViolation> {
    let mut previous: Option<&LedgerEntry> = None;

    for (index, entry) in entries.iter().enumerate() {
        let fail = |reason| ChainViolation {
            index,
            sequence_number: entry.sequence_number,
            reason,
        };

        let expected_seq = index as u64 + 1;
        if entry.sequence_number != expected_seq {
            return Err(fail(ChainBreak::SequenceGap {
                expected: expected_seq,
                found: entry.sequence_number,
            }));
        }

        if let Some(prev) = previous {
            if entry.ledger_id != prev.ledger_id {
                return Err(fail(ChainBreak::ForeignEntry {
                    expected: prev.ledger_id,
                    found: entry.ledger_id,
                }));
            }
        }

        if entry.previous_hash != previous.map(|p| p.entry_hash) {
            return Err(fail(ChainBreak::PreviousHashMismatch));
        }
        if entry.previous_entry_id != previous.map(|p| p.entry_id) {
            return Err(fail(ChainBreak::PredecessorMismatch));
        }

        if entry.compute_content_hash(algorithm) != entry.content_hash {
            return Err(fail(ChainBreak::ContentHashMismatch));
        }

        let computed = entry.compute_entry_hash(algorithm);
        if computed != entry.entry_hash {
            return Err(fail(ChainBreak::EntryHashMismatch {
                stored: entry.entry_hash,
                computed,
            }));
        }

        previous = Some(entry);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn field() -> Location {
        Location::labeled("geo-field-a", "North Block")
    }

    fn make_chain(n: usize) -> (Ledger, Vec<LedgerEntry>) {
        let (mut ledger, _) = Ledger::create(
            NewLedger::new("field_visit", field()).participant("user-ana"),
            t0(),
        );
        let mut entries = Vec::new();
        for i in 0..n {
            let draft = EntryDraft::content(
                Author::inferred("user-ana"),
                json!({ "text": format!("message {}", i + 1) }),
            );
            let entry = ledger
                .append(draft, t0() + Duration::seconds(i as i64 + 1))
                .unwrap();
            entries.push(entry);
        }
        (ledger, entries)
    }

    #[test]
    fn test_create_empty() {
        let (ledger, first) = Ledger::create(NewLedger::new("discussion", field()), t0());
        assert!(first.is_none());
        assert_eq!(ledger.status, LedgerStatus::Active);
        assert_eq!(ledger.counters.packet_count, 0);
        assert_eq!(ledger.chain.root_hash, None);
        assert_eq!(ledger.chain.last_hash, None);
        assert_eq!(ledger.chain.algorithm, HashAlgorithm::Sha256);
        assert_eq!(ledger.revision, 0);
    }

    #[test]
    fn test_create_with_first_entry() {
        let draft = EntryDraft::content(Author::inferred("user-ana"), json!({"text": "hi"}));
        let (ledger, first) = Ledger::create(
            NewLedger::new("discussion", field()).first_entry(draft),
            t0(),
        );
        let first = first.unwrap();
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.previous_hash, None);
        assert_eq!(first.previous_entry_id, None);
        assert_eq!(ledger.counters.packet_count, 1);
        assert_eq!(ledger.counters.content_count, 1);
        assert_eq!(ledger.chain.root_hash, Some(first.entry_hash));
        assert_eq!(ledger.chain.last_hash, Some(first.entry_hash));
        assert_eq!(ledger.counters.first_entry_id, Some(first.entry_id));
        assert!(ledger.verify_entries(&[first]).is_ok());
    }

    #[test]
    fn test_participant_kinds_inferred() {
        let (ledger, _) = Ledger::create(
            NewLedger::new("discussion", field())
                .participant("user-ana")
                .participant("agent-pan-007")
                .participant("user-ana"),
            t0(),
        );
        assert_eq!(ledger.participants.len(), 2);
        assert_eq!(ledger.participants[0].kind, AgentKind::Human);
        assert_eq!(ledger.participants[1].kind, AgentKind::Ai);
    }

    #[test]
    fn test_append_links_entries() {
        let (ledger, entries) = make_chain(3);
        assert_eq!(entries[1].previous_hash, Some(entries[0].entry_hash));
        assert_eq!(entries[1].previous_entry_id, Some(entries[0].entry_id));
        assert_eq!(entries[2].sequence_number, 3);
        assert_eq!(ledger.chain.root_hash, Some(entries[0].entry_hash));
        assert_eq!(ledger.chain.last_hash, Some(entries[2].entry_hash));
        assert_eq!(ledger.counters.last_entry_id, Some(entries[2].entry_id));
        assert_eq!(ledger.updated_at, t0() + Duration::seconds(3));
    }

    #[test]
    fn test_counters_by_kind() {
        let (mut ledger, _) = Ledger::create(NewLedger::new("discussion", field()), t0());
        let author = Author::inferred("user-ana");
        ledger
            .append(EntryDraft::content(author.clone(), json!({"text": "a"})), t0())
            .unwrap();
        ledger
            .append(EntryDraft::reference(author.clone(), json!({"packet_id": "x"})), t0())
            .unwrap();
        ledger
            .append(EntryDraft::reference(author, json!({"packet_id": "y"})), t0())
            .unwrap();
        assert_eq!(ledger.counters.packet_count, 3);
        assert_eq!(ledger.counters.content_count, 1);
        assert_eq!(ledger.counters.reference_count, 2);
    }

    #[test]
    fn test_verify_unmodified_chain() {
        let (ledger, entries) = make_chain(5);
        assert!(verify_chain(&entries, HashAlgorithm::Sha256).is_ok());
        assert!(ledger.verify_entries(&entries).is_ok());
        // Verification is read-only; a second pass agrees.
        assert!(verify_chain(&entries, HashAlgorithm::Sha256).is_ok());
    }

    #[test]
    fn test_verify_empty_chain() {
        let (ledger, _) = Ledger::create(NewLedger::new("discussion", field()), t0());
        assert!(verify_chain(&[], HashAlgorithm::Sha256).is_ok());
        assert!(ledger.verify_entries(&[]).is_ok());
    }

    #[test]
    fn test_payload_tamper_detected_at_entry_three() {
        let (_, mut entries) = make_chain(5);
        entries[2].payload = json!({"text": "rewritten history"});

        let err = verify_chain(&entries, HashAlgorithm::Sha256).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.sequence_number, 3);
        assert_eq!(err.reason, ChainBreak::ContentHashMismatch);
    }

    #[test]
    fn test_rehashed_tamper_breaks_successor() {
        // An attacker who also fixes entry 3's own hashes still breaks entry 4.
        let (_, mut entries) = make_chain(5);
        entries[2].payload = json!({"text": "rewritten history"});
        entries[2].content_hash = entries[2].compute_content_hash(HashAlgorithm::Sha256);
        entries[2].entry_hash = entries[2].compute_entry_hash(HashAlgorithm::Sha256);

        let err = verify_chain(&entries, HashAlgorithm::Sha256).unwrap_err();
        assert_eq!(err.index, 3);
        assert_eq!(err.reason, ChainBreak::PreviousHashMismatch);
    }

    #[test]
    fn test_stored_reference_geoid_rewrite_detected() {
        let (mut ledger, _) = Ledger::create(NewLedger::new("field_visit", field()), t0());
        let draft = EntryDraft::reference(
            Author::inferred("user-ana"),
            json!({"packet_id": "01J9Z8Y7X6W5V4T3S2R1Q0P9N8", "geoid": "geo-real"}),
        );
        let entry = ledger.append(draft, t0()).unwrap();

        // Edit the stored row directly, as a storage-level attacker could.
        let mut row = serde_json::to_value(&entry).unwrap();
        row["payload"]["geoid"] = json!("geo-forged");
        let forged: LedgerEntry = serde_json::from_value(row).unwrap();

        let err = ledger.verify_entries(&[forged]).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Chain(ChainViolation { index: 0, reason: ChainBreak::ContentHashMismatch, .. })
        ));
        assert!(ledger.verify_entries(&[entry]).is_ok());
    }

    #[test]
    fn test_author_tamper_detected() {
        let (_, mut entries) = make_chain(3);
        entries[1].author = Author::inferred("user-mallory");
        let err = verify_chain(&entries, HashAlgorithm::Sha256).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(matches!(err.reason, ChainBreak::EntryHashMismatch { .. }));
    }

    #[test]
    fn test_gap_detected() {
        let (_, mut entries) = make_chain(5);
        entries.remove(1);
        let err = verify_chain(&entries, HashAlgorithm::Sha256).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(
            err.reason,
            ChainBreak::SequenceGap {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_reorder_detected() {
        let (_, mut entries) = make_chain(4);
        entries.swap(1, 2);
        let err = verify_chain(&entries, HashAlgorithm::Sha256).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(matches!(err.reason, ChainBreak::SequenceGap { .. }));
    }

    #[test]
    fn test_predecessor_id_checked() {
        let (_, mut entries) = make_chain(3);
        entries[2].previous_entry_id = Some(entries[2].entry_id);
        let err = verify_chain(&entries, HashAlgorithm::Sha256).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.reason, ChainBreak::PredecessorMismatch);
    }

    #[test]
    fn test_summary_mismatch_detected() {
        let (mut ledger, entries) = make_chain(3);
        ledger.counters.packet_count = 4;
        assert!(matches!(
            ledger.verify_entries(&entries),
            Err(LedgerError::SummaryMismatch(_))
        ));

        let (ledger, entries) = make_chain(3);
        // Truncating the tail keeps the chain valid but not the summary.
        assert!(matches!(
            ledger.verify_entries(&entries[..2]),
            Err(LedgerError::SummaryMismatch(_))
        ));
    }

    #[test]
    fn test_archived_rejects_append() {
        let (mut ledger, _) = make_chain(2);
        assert!(ledger.archive(t0()));
        assert!(!ledger.archive(t0()));
        assert!(ledger.is_archived());

        let draft = EntryDraft::content(Author::inferred("user-ana"), json!({"text": "late"}));
        let result = ledger.append(draft, t0());
        assert_eq!(result, Err(LedgerError::Archived(ledger.ledger_id)));
        assert_eq!(ledger.counters.packet_count, 2);
    }

    #[test]
    fn test_add_participant_idempotent() {
        let (mut ledger, _) = make_chain(0);
        let before = ledger.participants.len();
        let revision = ledger.revision;
        assert!(!ledger.add_participant("user-ana", AgentKind::Human, t0()));
        assert_eq!(ledger.participants.len(), before);
        assert_eq!(ledger.revision, revision);

        assert!(ledger.add_participant("user-ben", AgentKind::Human, t0()));
        assert!(!ledger.add_participant("user-ben", AgentKind::Human, t0()));
        assert_eq!(ledger.participants.len(), before + 1);
    }

    #[test]
    fn test_revision_tracks_mutations() {
        let (mut ledger, _) = make_chain(0);
        assert_eq!(ledger.revision, 0);
        ledger
            .append(
                EntryDraft::content(Author::inferred("user-ana"), json!({})),
                t0(),
            )
            .unwrap();
        ledger.link_source(
            LinkedSource {
                source_type: "weather".into(),
                geoid: GeoId::new("geo-field-a"),
                from: t0(),
                to: t0() + Duration::days(1),
            },
            t0(),
        );
        ledger.archive(t0());
        assert_eq!(ledger.revision, 3);
        assert_eq!(ledger.linked_sources.len(), 1);
    }

    #[test]
    fn test_time_index_truncated_to_millis() {
        let (mut ledger, _) = make_chain(0);
        let now = t0() + Duration::nanoseconds(1_234_567);
        let entry = ledger
            .append(EntryDraft::content(Author::inferred("user-ana"), json!({})), now)
            .unwrap();
        assert_eq!(entry.time_index, t0() + Duration::milliseconds(1));
        assert!(verify_chain(&[entry], HashAlgorithm::Sha256).is_ok());
    }

    #[test]
    fn test_entry_hash_golden() {
        let entry = LedgerEntry {
            entry_id: EntryId::from_string("01J9Z8Y7X6W5V4T3S2R1Q0P9NB").unwrap(),
            ledger_id: LedgerId::from_string("01J9Z8Y7X6W5V4T3S2R1Q0P9NC").unwrap(),
            kind: EntryKind::Content,
            sequence_number: 1,
            previous_hash: None,
            previous_entry_id: None,
            time_index: t0(),
            author: Author::new("user-ana", AgentKind::Human).with_name("Ana"),
            payload: json!({"text": "Starting field inspection"}),
            content_hash: Digest::from_bytes([0u8; 32]),
            entry_hash: Digest::from_bytes([0u8; 32]),
        };
        assert_eq!(
            entry.compute_content_hash(HashAlgorithm::Sha256).to_hex(),
            "ff885bf8d1b2af6a2db6e6249b12e338304eacdb5ec467bac2d8d9c0703ef975"
        );

        let content_hash = entry.compute_content_hash(HashAlgorithm::Sha256);
        let entry = LedgerEntry {
            content_hash,
            ..entry
        };
        assert_eq!(
            entry.compute_entry_hash(HashAlgorithm::Sha256).to_hex(),
            "a33a44b67119a06161e14b5a3fc5f2be3edcaee85679404418839b2125f1c867"
        );
    }

    #[test]
    fn test_blake3_ledger_verifies_with_its_own_algorithm() {
        let (mut ledger, _) = Ledger::create(
            NewLedger::new("discussion", field()).algorithm(HashAlgorithm::Blake3),
            t0(),
        );
        let mut entries = Vec::new();
        for i in 0..3 {
            entries.push(
                ledger
                    .append(
                        EntryDraft::content(Author::inferred("user-ana"), json!({ "n": i })),
                        t0(),
                    )
                    .unwrap(),
            );
        }
        assert!(ledger.verify_entries(&entries).is_ok());
        assert!(verify_chain(&entries, HashAlgorithm::Sha256).is_err());
    }

    #[test]
    fn test_field_visit_template() {
        let user = Author::new("user-john", AgentKind::Human).with_name("John Smith");
        let (ledger, first) = Ledger::create(
            NewLedger::field_visit(
                Location::labeled("field-a", "North Block"),
                user,
                Some("agent-pan-007"),
                Some("Starting field inspection"),
            ),
            t0(),
        );
        assert_eq!(ledger.ledger_type, "field_visit");
        assert_eq!(ledger.topics, vec!["field_inspection"]);
        assert!(ledger.has_participant("user-john"));
        assert!(ledger.has_participant("agent-pan-007"));
        let first = first.unwrap();
        assert_eq!(first.payload, json!({"text": "Starting field inspection"}));
        assert_eq!(first.author.name.as_deref(), Some("John Smith"));
    }

    #[test]
    fn test_discussion_template() {
        let (ledger, first) = Ledger::create(
            NewLedger::discussion(
                "pest_management",
                Location::labeled("field-b", "South Block"),
                &["user-manager", "user-agronomist"],
                None,
                Some("Need advice on aphid outbreak"),
            ),
            t0(),
        );
        assert_eq!(ledger.ledger_type, "discussion");
        assert_eq!(ledger.participants.len(), 2);
        assert_eq!(first.unwrap().author.agent_id, "user-manager");
    }

    #[test]
    fn test_serde_roundtrip_preserves_hashes() {
        let (ledger, entries) = make_chain(2);
        let json = serde_json::to_string(&entries).unwrap();
        let back: Vec<LedgerEntry> = serde_json::from_str(&json).unwrap();
        assert!(ledger.verify_entries(&back).is_ok());

        let root: Ledger = serde_json::from_str(&serde_json::to_string(&ledger).unwrap()).unwrap();
        assert_eq!(root, ledger);
    }
}
