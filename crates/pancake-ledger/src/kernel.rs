//! The Kernel: unified API for the Pancake ledger.
//!
//! The Kernel brings together the geo resolver, packet validation, storage
//! and the engagement ledgers into one interface for building services.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pancake_ledger_core::{
    truncate_text, validate_packet, validate_size, validate_structure_within, AgentKind, Author,
    Digest, EntryDraft, GeoId, Ledger, LedgerEntry, LedgerId, LinkedSource, NewLedger, Packet,
    PacketBuilder, PacketId, PacketQuery, Page, ValidationError, DEFAULT_LIMIT, TAG_TRUNCATED,
};
use pancake_ledger_store::{InsertResult, Store, StoreError, StoreExt};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};
use crate::geo::{CaptureLocation, CollaboratorError, GeoResolver, UnconfiguredResolver};
use crate::intake::{ChatMessage, IntakeRequest, ScoutingReport};

/// Packet type produced by scouting intake.
pub const TYPE_NOTE: &str = "note";
/// Packet type produced by chat intake.
pub const TYPE_CHAT_MESSAGE: &str = "chat_message";

/// Page size used when walking a whole thread.
const THREAD_PAGE: i64 = 200;

/// Result of ingesting an externally built packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    /// Packet was new and has been stored.
    Accepted(PacketId),
    /// The identical packet was already stored.
    Duplicate,
    /// A different packet is stored under the same id.
    Conflict { existing: Digest },
}

/// Filters for a chat message search.
///
/// Thread membership lives outside the kernel; callers pass the threads
/// the searching user may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSearch {
    pub thread_ids: Vec<String>,
    pub keyword: Option<String>,
    pub geoid: Option<GeoId>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub cursor: Option<PacketId>,
}

impl MessageSearch {
    pub fn new<I, T>(thread_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            thread_ids: thread_ids.into_iter().map(Into::into).collect(),
            keyword: None,
            geoid: None,
            time_from: None,
            time_to: None,
            limit: DEFAULT_LIMIT,
            cursor: None,
        }
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn geoid(mut self, geoid: impl Into<GeoId>) -> Self {
        self.geoid = Some(geoid.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.time_from = Some(from);
        self.time_to = Some(to);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn cursor(mut self, cursor: PacketId) -> Self {
        self.cursor = Some(cursor);
        self
    }

    fn to_query(&self) -> PacketQuery {
        PacketQuery {
            geoid: self.geoid.clone(),
            packet_type: Some(TYPE_CHAT_MESSAGE.to_string()),
            time_from: self.time_from,
            time_to: self.time_to,
            keyword: self.keyword.clone(),
            thread_ids: Some(self.thread_ids.clone()),
            limit: self.limit,
            cursor: self.cursor,
        }
    }
}

/// The main Kernel struct.
///
/// Provides a unified API for:
/// - Packet intake (generic, scouting, chat) and raw ingest
/// - Packet reads, filtered queries and message search
/// - Engagement ledgers: create, append, participants, verification
pub struct Kernel<S: Store, R: GeoResolver = UnconfiguredResolver> {
    /// The storage backend.
    store: Arc<S>,
    /// Turns capture locations into geoids.
    resolver: R,
    /// Configuration.
    config: KernelConfig,
}

impl<S: Store, R: GeoResolver> Kernel<S, R> {
    /// Create a new kernel instance.
    pub fn new(store: S, resolver: R, config: KernelConfig) -> Self {
        Self {
            store: Arc::new(store),
            resolver,
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Intake Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Build, validate and store a packet of any type.
    ///
    /// The body is size-checked before the location is resolved, so an
    /// oversized request never reaches the resolver. Nothing is stored
    /// unless every step succeeds.
    pub async fn intake(&self, request: IntakeRequest) -> Result<Packet> {
        validate_size(&request.body, self.config.max_body_bytes)?;

        let geoid = self.resolve(&request.location).await?;

        let mut builder = PacketBuilder::new(request.packet_type, geoid, request.body)
            .tags(request.tags);
        if let Some(observed_at) = request.observed_at {
            builder = builder.observed_at(observed_at);
        }
        if let Some(tenant) = request.tenant {
            builder = builder.tenant(tenant);
        }
        if let Some(prev) = request.prev {
            builder = builder.prev(prev);
        }
        if let Some(lang) = request.lang {
            builder = builder.lang(lang);
        }
        let packet = builder.build();
        validate_packet(&packet)?;

        self.store_local(&packet, &request.extra_geoids).await?;
        Ok(packet)
    }

    /// Store a field scouting report as a `note` packet.
    pub async fn intake_scouting(&self, report: ScoutingReport) -> Result<Packet> {
        let body = report.body();
        let mut request = IntakeRequest::new(TYPE_NOTE, report.location, body);
        request.observed_at = report.observed_at;
        request.tenant = report.tenant;
        self.intake(request).await
    }

    /// Store a chat message as a `chat_message` packet.
    ///
    /// Text longer than `chat_max_chars` code points is cut and the packet
    /// is tagged `truncated`.
    pub async fn intake_chat_message(&self, message: ChatMessage) -> Result<Packet> {
        if message.thread_id.trim().is_empty() {
            return Err(ValidationError::ShapeViolation("thread_id is required".into()).into());
        }

        let (body, truncated) = {
            let (text, truncated) = truncate_text(&message.text, self.config.chat_max_chars);
            (message.body(&text), truncated)
        };
        if truncated {
            debug!(thread_id = %message.thread_id, "chat text truncated");
        }

        let mut request = IntakeRequest::new(TYPE_CHAT_MESSAGE, message.location, body);
        request.observed_at = message.observed_at;
        request.extra_geoids = message.geoids;
        if truncated {
            request.tags.push(TAG_TRUNCATED.to_string());
        }
        self.intake(request).await
    }

    /// Resolve a location exactly once, bounded by the collaborator timeout.
    async fn resolve(&self, location: &CaptureLocation) -> Result<GeoId> {
        let timeout = self.config.collaborator_timeout;
        let geoid = tokio::time::timeout(timeout, self.resolver.resolve(location))
            .await
            .map_err(|_| CollaboratorError::Timeout {
                collaborator: "geo resolver",
                timeout,
            })??;

        if geoid.is_empty() {
            return Err(CollaboratorError::geocoder("resolved an empty geoid").into());
        }
        Ok(geoid)
    }

    /// Store a packet built by this kernel.
    async fn store_local(&self, packet: &Packet, extra_geoids: &[GeoId]) -> Result<()> {
        match self.store.insert_packet(packet, extra_geoids).await? {
            InsertResult::Inserted => {
                info!(
                    packet_id = %packet.id(),
                    geoid = %packet.geoid(),
                    packet_type = packet.packet_type(),
                    "packet stored"
                );
                Ok(())
            }
            InsertResult::AlreadyExists => Ok(()),
            InsertResult::Conflict { existing } => Err(KernelError::Conflict {
                packet_id: packet.id(),
                existing,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingest Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingest a packet built elsewhere.
    ///
    /// The body is size-checked before the packet is hashed, so an oversized
    /// packet is a `SizeViolation` whatever its footer says.
    pub async fn ingest(&self, raw: &Value, extra_geoids: &[GeoId]) -> Result<IngestResult> {
        let max_body_bytes = self.config.max_body_bytes;
        let packet = if self.config.validate_on_ingest {
            validate_structure_within(raw, max_body_bytes).map_err(|e| {
                if e.is_integrity() {
                    warn!(error = %e, "rejected packet with bad hash");
                }
                e
            })?
        } else {
            let packet: Packet = serde_json::from_value(raw.clone()).map_err(|e| {
                ValidationError::ShapeViolation(format!("malformed packet: {}", e))
            })?;
            validate_size(&packet.body, max_body_bytes)?;
            packet
        };

        if packet.observed_at().is_none() {
            return Err(ValidationError::ShapeViolation(format!(
                "Header.timestamp '{}' is not a valid timestamp",
                packet.header.timestamp
            ))
            .into());
        }

        let packet_id = packet.id();
        match self.store.insert_packet(&packet, extra_geoids).await? {
            InsertResult::Inserted => {
                info!(packet_id = %packet_id, geoid = %packet.geoid(), "packet ingested");
                Ok(IngestResult::Accepted(packet_id))
            }
            InsertResult::AlreadyExists => Ok(IngestResult::Duplicate),
            InsertResult::Conflict { existing } => {
                warn!(packet_id = %packet_id, existing = %existing, "conflicting packet id");
                Ok(IngestResult::Conflict { existing })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a packet by ID.
    ///
    /// With `verify_on_read`, a stored packet whose hash no longer matches
    /// is an `IntegrityViolation`, never a silent success.
    pub async fn get_packet(&self, id: &PacketId) -> Result<Option<Packet>> {
        let packet = self.store.get_packet(id).await?;
        if let Some(packet) = &packet {
            self.check_read(packet)?;
        }
        Ok(packet)
    }

    /// Secondary geoids recorded for a packet.
    pub async fn packet_geoids(&self, id: &PacketId) -> Result<Vec<GeoId>> {
        Ok(self.store.packet_geoids(id).await?)
    }

    /// Filtered, paginated scan, newest first.
    pub async fn query_packets(&self, query: &PacketQuery) -> Result<Page<Packet>> {
        query.validate()?;
        debug!(?query, "querying packets");

        let page = self.store.query_packets(query).await?;
        for packet in &page.items {
            self.check_read(packet)?;
        }
        Ok(page)
    }

    /// Search chat messages within the given threads.
    ///
    /// An empty thread list matches nothing.
    pub async fn search_messages(&self, search: &MessageSearch) -> Result<Page<Packet>> {
        self.query_packets(&search.to_query()).await
    }

    /// Every message in a thread, oldest first.
    pub async fn thread_messages(&self, thread_id: &str) -> Result<Vec<Packet>> {
        let query = PacketQuery::new()
            .packet_type(TYPE_CHAT_MESSAGE)
            .thread_ids([thread_id])
            .limit(THREAD_PAGE);

        let mut packets = self.store.scan_packets(&query).await?;
        for packet in &packets {
            self.check_read(packet)?;
        }
        packets.reverse();
        Ok(packets)
    }

    fn check_read(&self, packet: &Packet) -> Result<()> {
        if !self.config.verify_on_read {
            return Ok(());
        }
        validate_packet(packet).map_err(|e| {
            warn!(packet_id = %packet.id(), error = %e, "stored packet failed verification");
            KernelError::from(e)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a ledger, with its first entry if the request carries one.
    ///
    /// New ledgers use the configured digest algorithm.
    pub async fn create_ledger(&self, new: NewLedger) -> Result<(Ledger, Option<LedgerEntry>)> {
        let new = new.algorithm(self.config.ledger_algorithm);
        let (ledger, first) = Ledger::create(new, Utc::now());

        self.store.insert_ledger(&ledger, first.as_ref()).await?;
        info!(
            ledger_id = %ledger.ledger_id,
            ledger_type = %ledger.ledger_type,
            participants = ledger.participants.len(),
            "ledger created"
        );
        Ok((ledger, first))
    }

    /// Append an entry.
    ///
    /// Root and entry are committed together. A concurrent writer makes the
    /// commit stale; the append is then replayed on the fresh root.
    pub async fn append_entry(&self, ledger_id: &LedgerId, draft: EntryDraft) -> Result<LedgerEntry> {
        let (_, entry) = self
            .mutate_ledger(ledger_id, |ledger, now| {
                let entry = ledger.append(draft.clone(), now)?;
                Ok((entry.clone(), Some(entry)))
            })
            .await?;

        info!(
            ledger_id = %ledger_id,
            entry_id = %entry.entry_id,
            sequence_number = entry.sequence_number,
            kind = entry.kind.as_str(),
            "ledger entry appended"
        );
        Ok(entry)
    }

    /// Append a `reference` entry pointing at a stored packet.
    pub async fn append_reference(
        &self,
        ledger_id: &LedgerId,
        author: Author,
        packet_id: &PacketId,
    ) -> Result<LedgerEntry> {
        let packet = self
            .get_packet(packet_id)
            .await?
            .ok_or_else(|| KernelError::PacketNotFound(*packet_id))?;

        let payload = json!({
            "packet_id": packet_id.to_string(),
            "packet_hash": packet.footer.hash.to_hex(),
            "packet_type": packet.packet_type(),
            "geoid": packet.geoid().as_str(),
        });
        self.append_entry(ledger_id, EntryDraft::reference(author, payload))
            .await
    }

    /// Add a participant. Returns `false` if the agent was already present.
    ///
    /// The kind is inferred from the agent id when not given.
    pub async fn add_participant(
        &self,
        ledger_id: &LedgerId,
        agent_id: &str,
        kind: Option<AgentKind>,
    ) -> Result<bool> {
        let kind = kind.unwrap_or_else(|| AgentKind::infer(agent_id));
        let (_, added) = self
            .mutate_ledger(ledger_id, |ledger, now| {
                Ok((ledger.add_participant(agent_id, kind, now), None))
            })
            .await?;

        if added {
            info!(ledger_id = %ledger_id, agent_id, kind = kind.as_str(), "participant added");
        }
        Ok(added)
    }

    /// Correlate an external data source with a ledger.
    pub async fn link_source(&self, ledger_id: &LedgerId, source: LinkedSource) -> Result<Ledger> {
        let (ledger, ()) = self
            .mutate_ledger(ledger_id, |ledger, now| {
                ledger.link_source(source.clone(), now);
                Ok(((), None))
            })
            .await?;

        info!(
            ledger_id = %ledger_id,
            source_type = %source.source_type,
            geoid = %source.geoid,
            "source linked"
        );
        Ok(ledger)
    }

    /// Archive a ledger. Returns `false` if it already was archived.
    pub async fn archive_ledger(&self, ledger_id: &LedgerId) -> Result<bool> {
        let (_, archived) = self
            .mutate_ledger(ledger_id, |ledger, now| Ok((ledger.archive(now), None)))
            .await?;

        if archived {
            info!(ledger_id = %ledger_id, "ledger archived");
        }
        Ok(archived)
    }

    /// Get a ledger root by ID.
    pub async fn get_ledger(&self, ledger_id: &LedgerId) -> Result<Option<Ledger>> {
        Ok(self.store.get_ledger(ledger_id).await?)
    }

    /// All entries of a ledger, in sequence order.
    pub async fn ledger_entries(&self, ledger_id: &LedgerId) -> Result<Vec<LedgerEntry>> {
        self.load_ledger(ledger_id).await?;
        Ok(self.store.get_entries(ledger_id).await?)
    }

    /// List ledgers, optionally only those `participant` belongs to.
    pub async fn list_ledgers(&self, participant: Option<&str>) -> Result<Vec<Ledger>> {
        Ok(self.store.list_ledgers(participant).await?)
    }

    /// Verify a ledger's chain and root summary against its stored entries.
    ///
    /// Returns the number of entries verified.
    pub async fn verify_ledger(&self, ledger_id: &LedgerId) -> Result<usize> {
        let ledger = self.load_ledger(ledger_id).await?;
        let entries = self.store.get_entries(ledger_id).await?;

        ledger.verify_entries(&entries).map_err(|e| {
            warn!(ledger_id = %ledger_id, error = %e, "ledger failed verification");
            KernelError::from(e)
        })?;

        debug!(ledger_id = %ledger_id, entries = entries.len(), "ledger verified");
        Ok(entries.len())
    }

    async fn load_ledger(&self, ledger_id: &LedgerId) -> Result<Ledger> {
        self.store
            .get_ledger(ledger_id)
            .await?
            .ok_or_else(|| KernelError::LedgerNotFound(*ledger_id))
    }

    /// Read-modify-write a ledger root under its revision.
    ///
    /// `apply` may run more than once. A mutation that leaves the revision
    /// unchanged is not written.
    async fn mutate_ledger<T, F>(&self, ledger_id: &LedgerId, mut apply: F) -> Result<(Ledger, T)>
    where
        F: FnMut(&mut Ledger, DateTime<Utc>) -> Result<(T, Option<LedgerEntry>)>,
    {
        let mut attempt = 0;
        loop {
            let mut ledger = self.load_ledger(ledger_id).await?;
            let expected = ledger.revision;

            let (value, entry) = apply(&mut ledger, Utc::now())?;
            if ledger.revision == expected {
                return Ok((ledger, value));
            }

            match self
                .store
                .update_ledger(&ledger, entry.as_ref(), expected)
                .await
            {
                Ok(()) => return Ok((ledger, value)),
                Err(StoreError::StaleRevision { actual, .. }) if attempt < self.config.append_retries => {
                    attempt += 1;
                    debug!(
                        ledger_id = %ledger_id,
                        expected,
                        actual,
                        attempt,
                        "stale ledger revision, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_search_query() {
        let search = MessageSearch::new(["t1", "t2"])
            .keyword("Rust")
            .geoid("geo-a")
            .limit(10);
        let query = search.to_query();

        assert_eq!(query.packet_type.as_deref(), Some(TYPE_CHAT_MESSAGE));
        assert_eq!(
            query.thread_ids,
            Some(vec!["t1".to_string(), "t2".to_string()])
        );
        assert_eq!(query.keyword.as_deref(), Some("Rust"));
        assert_eq!(query.geoid, Some(GeoId::new("geo-a")));
        assert_eq!(query.limit, 10);
    }
}
