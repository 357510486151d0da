//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use pancake_ledger_core::{
    GeoId, Ledger, LedgerEntry, LedgerId, Packet, PacketId, PacketQuery, Page, SortKey,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// multi-record write happens under one write guard.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Packets indexed by id.
    packets: HashMap<PacketId, Packet>,

    /// Secondary index: packet id -> extra geoids.
    geoids: HashMap<PacketId, BTreeSet<GeoId>>,

    /// Ledger roots.
    ledgers: HashMap<LedgerId, Ledger>,

    /// Ledger entries, in sequence order.
    entries: HashMap<LedgerId, Vec<LedgerEntry>>,
}

impl MemoryStoreInner {
    fn secondary(&self, id: &PacketId) -> Vec<GeoId> {
        self.geoids
            .get(id)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn push_entry(&mut self, entry: &LedgerEntry) -> Result<()> {
        let entries = self.entries.entry(entry.ledger_id).or_default();
        if entry.sequence_number != entries.len() as u64 + 1 {
            return Err(StoreError::Conflict(format!(
                "ledger {} already has entry #{}",
                entry.ledger_id, entry.sequence_number
            )));
        }
        entries.push(entry.clone());
        Ok(())
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_packet(&self, packet: &Packet, extra_geoids: &[GeoId]) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let id = packet.id();

        if let Some(existing) = inner.packets.get(&id) {
            if existing.footer.hash == packet.footer.hash {
                return Ok(InsertResult::AlreadyExists);
            }
            return Ok(InsertResult::Conflict {
                existing: existing.footer.hash,
            });
        }

        inner.packets.insert(id, packet.clone());
        let secondary: BTreeSet<GeoId> = extra_geoids
            .iter()
            .filter(|g| !g.is_empty() && *g != packet.geoid())
            .cloned()
            .collect();
        if !secondary.is_empty() {
            inner.geoids.insert(id, secondary);
        }

        Ok(InsertResult::Inserted)
    }

    async fn get_packet(&self, id: &PacketId) -> Result<Option<Packet>> {
        let inner = self.read()?;
        Ok(inner.packets.get(id).cloned())
    }

    async fn has_packet(&self, id: &PacketId) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.packets.contains_key(id))
    }

    async fn packet_geoids(&self, id: &PacketId) -> Result<Vec<GeoId>> {
        let inner = self.read()?;
        Ok(inner.secondary(id))
    }

    async fn query_packets(&self, query: &PacketQuery) -> Result<Page<Packet>> {
        let limit = query
            .validate()
            .map_err(|e| StoreError::BadRequest(e.to_string()))?;
        let inner = self.read()?;

        let cursor = match &query.cursor {
            Some(id) => {
                let packet = inner
                    .packets
                    .get(id)
                    .ok_or_else(|| StoreError::BadRequest(format!("unknown cursor {}", id)))?;
                Some(SortKey::of(packet))
            }
            None => None,
        };

        let mut hits: Vec<(SortKey, &Packet)> = inner
            .packets
            .values()
            .map(|p| (SortKey::of(p), p))
            .filter(|(key, _)| cursor.map_or(true, |c| key.is_after(&c)))
            .filter(|(_, p)| query.matches(p, &inner.secondary(&p.id())))
            .collect();
        hits.sort_by(|(a, _), (b, _)| a.result_order(b));
        hits.truncate(limit + 1);

        let rows = hits.into_iter().map(|(_, p)| p.clone()).collect();
        Ok(Page::from_probe(rows, limit, Packet::id))
    }

    async fn insert_ledger(&self, ledger: &Ledger, first: Option<&LedgerEntry>) -> Result<()> {
        let mut inner = self.write()?;
        if inner.ledgers.contains_key(&ledger.ledger_id) {
            return Err(StoreError::Conflict(format!(
                "ledger {} already exists",
                ledger.ledger_id
            )));
        }
        if let Some(entry) = first {
            inner.push_entry(entry)?;
        }
        inner.ledgers.insert(ledger.ledger_id, ledger.clone());
        Ok(())
    }

    async fn update_ledger(
        &self,
        ledger: &Ledger,
        entry: Option<&LedgerEntry>,
        expected_revision: u64,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let stored = inner
            .ledgers
            .get(&ledger.ledger_id)
            .ok_or_else(|| StoreError::NotFound(format!("ledger {}", ledger.ledger_id)))?;
        if stored.revision != expected_revision {
            return Err(StoreError::StaleRevision {
                ledger_id: ledger.ledger_id.to_string(),
                expected: expected_revision,
                actual: stored.revision,
            });
        }
        if let Some(entry) = entry {
            inner.push_entry(entry)?;
        }
        inner.ledgers.insert(ledger.ledger_id, ledger.clone());
        Ok(())
    }

    async fn get_ledger(&self, id: &LedgerId) -> Result<Option<Ledger>> {
        let inner = self.read()?;
        Ok(inner.ledgers.get(id).cloned())
    }

    async fn get_entries(&self, id: &LedgerId) -> Result<Vec<LedgerEntry>> {
        let inner = self.read()?;
        Ok(inner.entries.get(id).cloned().unwrap_or_default())
    }

    async fn list_ledgers(&self, participant: Option<&str>) -> Result<Vec<Ledger>> {
        let inner = self.read()?;
        let mut ledgers: Vec<Ledger> = inner
            .ledgers
            .values()
            .filter(|l| participant.map_or(true, |p| l.has_participant(p)))
            .cloned()
            .collect();
        ledgers.sort_by_key(|l| l.ledger_id);
        Ok(ledgers)
    }
}
