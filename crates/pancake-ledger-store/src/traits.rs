//! Store trait: the abstract interface for packet and ledger persistence.
//!
//! This trait allows the kernel to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use pancake_ledger_core::{
    Digest, GeoId, Ledger, LedgerEntry, LedgerId, Packet, PacketId, PacketQuery, Page,
};

use crate::error::Result;

/// Result of inserting a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Packet was inserted successfully.
    Inserted,
    /// The same packet already exists (idempotent - not an error).
    AlreadyExists,
    /// A packet with this id but different contents exists.
    Conflict {
        /// Hash of the stored packet.
        existing: Digest,
    },
}

/// The Store trait: async interface for packet and ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Atomicity
///
/// - A packet and its secondary geoid rows are written together or not at all.
/// - A ledger root and the entry appended with it are written together or
///   not at all. Root updates are checked against the revision the caller
///   read, so concurrent appends to one ledger cannot both succeed.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Packet Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a packet and its secondary geoids.
    ///
    /// # Returns
    /// - `Inserted` if the packet was new.
    /// - `AlreadyExists` if the exact same packet already exists.
    /// - `Conflict` if a different packet exists under the same id.
    async fn insert_packet(&self, packet: &Packet, extra_geoids: &[GeoId]) -> Result<InsertResult>;

    /// Get a packet by id.
    async fn get_packet(&self, id: &PacketId) -> Result<Option<Packet>>;

    /// Check if a packet exists by id.
    async fn has_packet(&self, id: &PacketId) -> Result<bool>;

    /// Secondary geoids recorded for a packet, sorted.
    async fn packet_geoids(&self, id: &PacketId) -> Result<Vec<GeoId>>;

    /// Execute a filtered, paginated scan.
    ///
    /// Results are ordered newest first by `(timestamp, id)`. An unknown
    /// cursor or a non-positive limit is `BadRequest`.
    async fn query_packets(&self, query: &PacketQuery) -> Result<Page<Packet>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a new ledger root with its first entry, if any.
    async fn insert_ledger(&self, ledger: &Ledger, first: Option<&LedgerEntry>) -> Result<()>;

    /// Replace a ledger root, appending `entry` in the same transaction.
    ///
    /// Fails with `StaleRevision` if the stored root is not at
    /// `expected_revision`.
    async fn update_ledger(
        &self,
        ledger: &Ledger,
        entry: Option<&LedgerEntry>,
        expected_revision: u64,
    ) -> Result<()>;

    /// Get a ledger root by id.
    async fn get_ledger(&self, id: &LedgerId) -> Result<Option<Ledger>>;

    /// All entries of a ledger, ordered by sequence number.
    async fn get_entries(&self, id: &LedgerId) -> Result<Vec<LedgerEntry>>;

    /// List ledgers, optionally only those `participant` belongs to.
    ///
    /// Ordered oldest first.
    async fn list_ledgers(&self, participant: Option<&str>) -> Result<Vec<Ledger>>;
}

/// Extension trait for common store patterns.
#[async_trait]
pub trait StoreExt: Store {
    /// Follow cursors until the scan is exhausted and return every match.
    async fn scan_packets(&self, query: &PacketQuery) -> Result<Vec<Packet>>;
}

#[async_trait]
impl<S: Store + ?Sized> StoreExt for S {
    async fn scan_packets(&self, query: &PacketQuery) -> Result<Vec<Packet>> {
        let mut query = query.clone();
        let mut packets = Vec::new();
        loop {
            let page = self.query_packets(&query).await?;
            packets.extend(page.items);
            match page.next_cursor {
                Some(cursor) => query.cursor = Some(cursor),
                None => return Ok(packets),
            }
        }
    }
}
