//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the Pancake ledger. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::debug;

use pancake_ledger_core::query::timestamp_millis;
use pancake_ledger_core::{
    canonical_string, Digest, GeoId, HashAlgorithm, Ledger, LedgerEntry, LedgerId, LedgerStatus,
    Packet, PacketId, PacketQuery, Page, CANONICAL_FORM,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Internal(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn row_to_packet(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get("header")?, row.get("body")?, row.get("footer")?))
}

fn decode_packet((header, body, footer): (String, String, String)) -> Result<Packet> {
    Ok(Packet {
        header: serde_json::from_str(&header)?,
        body: serde_json::from_str(&body)?,
        footer: serde_json::from_str(&footer)?,
    })
}

fn encode_root(ledger: &Ledger) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(ledger, &mut buf)
        .map_err(|e| StoreError::Serialization(format!("ledger root: {}", e)))?;
    Ok(buf)
}

fn decode_root(bytes: &[u8]) -> Result<Ledger> {
    ciborium::from_reader(bytes)
        .map_err(|e| StoreError::Serialization(format!("ledger root: {}", e)))
}

fn status_name(status: LedgerStatus) -> &'static str {
    match status {
        LedgerStatus::Active => "active",
        LedgerStatus::Archived => "archived",
    }
}

fn write_participants(tx: &Transaction<'_>, ledger: &Ledger) -> Result<()> {
    let id = ledger.ledger_id.to_string();
    tx.execute(
        "DELETE FROM ledger_participants WHERE ledger_id = ?1",
        params![id],
    )?;
    for participant in &ledger.participants {
        tx.execute(
            "INSERT OR IGNORE INTO ledger_participants (ledger_id, agent_id) VALUES (?1, ?2)",
            params![id, participant.agent_id],
        )?;
    }
    Ok(())
}

fn write_entry(tx: &Transaction<'_>, entry: &LedgerEntry) -> Result<()> {
    let ledger_id = entry.ledger_id.to_string();
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM ledger_entries WHERE ledger_id = ?1",
        params![ledger_id],
        |row| row.get(0),
    )?;
    if entry.sequence_number != count as u64 + 1 {
        return Err(StoreError::Conflict(format!(
            "ledger {} already has entry #{}",
            entry.ledger_id, entry.sequence_number
        )));
    }

    tx.execute(
        "INSERT INTO ledger_entries (
            entry_id, ledger_id, sequence_number, kind, entry_hash, record
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.entry_id.to_string(),
            ledger_id,
            entry.sequence_number as i64,
            entry.kind.as_str(),
            entry.entry_hash.to_hex(),
            serde_json::to_string(entry)?,
        ],
    )?;
    Ok(())
}

/// A WHERE clause under construction, with positional arguments.
struct Filter {
    sql: String,
    args: Vec<SqlValue>,
}

impl Filter {
    fn new(select: &str) -> Self {
        Self {
            sql: format!("{} WHERE 1 = 1", select),
            args: Vec::new(),
        }
    }

    /// Bind a value and return its placeholder number.
    fn bind(&mut self, value: SqlValue) -> usize {
        self.args.push(value);
        self.args.len()
    }

    fn and(&mut self, clause: &str) {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
    }
}

fn build_query(conn: &Connection, query: &PacketQuery, limit: usize) -> Result<Filter> {
    let mut filter = Filter::new("SELECT p.header, p.body, p.footer FROM packets p");

    if let Some(geoid) = &query.geoid {
        let n = filter.bind(SqlValue::Text(geoid.to_string()));
        filter.and(&format!(
            "(p.geoid = ?{n} OR EXISTS (SELECT 1 FROM packet_geoids g \
             WHERE g.packet_id = p.packet_id AND g.geoid = ?{n}))"
        ));
    }

    if let Some(packet_type) = &query.packet_type {
        let n = filter.bind(SqlValue::Text(packet_type.clone()));
        filter.and(&format!("p.packet_type = ?{n}"));
    }

    if let Some(from) = query.time_from {
        let n = filter.bind(SqlValue::Integer(from.timestamp_millis()));
        filter.and(&format!("p.ts_millis >= ?{n}"));
    }

    if let Some(to) = query.time_to {
        let n = filter.bind(SqlValue::Integer(to.timestamp_millis()));
        filter.and(&format!("p.ts_millis <= ?{n}"));
    }

    if let Some(keyword) = query.normalized_keyword() {
        let n = filter.bind(SqlValue::Text(keyword));
        filter.and(&format!("instr(p.search_text, ?{n}) > 0"));
    }

    if let Some(threads) = &query.thread_ids {
        let placeholders: Vec<String> = threads
            .iter()
            .map(|t| format!("?{}", filter.bind(SqlValue::Text(t.clone()))))
            .collect();
        filter.and(&format!("p.thread_id IN ({})", placeholders.join(", ")));
    }

    if let Some(cursor) = &query.cursor {
        let cursor_id = cursor.to_string();
        let cursor_ts: i64 = conn
            .query_row(
                "SELECT ts_millis FROM packets WHERE packet_id = ?1",
                params![cursor_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::BadRequest(format!("unknown cursor {}", cursor)))?;
        let ts = filter.bind(SqlValue::Integer(cursor_ts));
        let id = filter.bind(SqlValue::Text(cursor_id));
        filter.and(&format!(
            "(p.ts_millis < ?{ts} OR (p.ts_millis = ?{ts} AND p.packet_id < ?{id}))"
        ));
    }

    let n = filter.bind(SqlValue::Integer(limit as i64 + 1));
    filter
        .sql
        .push_str(&format!(" ORDER BY p.ts_millis DESC, p.packet_id DESC LIMIT ?{n}"));

    Ok(filter)
}

#[async_trait]
impl Store for SqliteStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Packet Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_packet(&self, packet: &Packet, extra_geoids: &[GeoId]) -> Result<InsertResult> {
        let packet = packet.clone();
        let secondary: BTreeSet<GeoId> = extra_geoids
            .iter()
            .filter(|g| !g.is_empty() && *g != packet.geoid())
            .cloned()
            .collect();

        self.run(move |conn| {
            let id = packet.id().to_string();
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT packet_hash FROM packets WHERE packet_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                let existing = Digest::from_hex(&existing)
                    .map_err(|e| StoreError::InvalidData(format!("packet_hash: {}", e)))?;
                return Ok(if existing == packet.footer.hash {
                    InsertResult::AlreadyExists
                } else {
                    InsertResult::Conflict { existing }
                });
            }

            tx.execute(
                "INSERT INTO packets (
                    packet_id, geoid, packet_type, timestamp, ts_millis, prev_packet_id,
                    thread_id, search_text, header, body, footer, packet_hash,
                    hash_algorithm, canonical_form, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    id,
                    packet.geoid().as_str(),
                    packet.packet_type(),
                    packet.header.timestamp,
                    timestamp_millis(&packet),
                    packet.prev().map(|p| p.to_string()),
                    packet.thread_id(),
                    packet.search_text().map(str::to_lowercase),
                    canonical_string(&packet.header.to_value()),
                    canonical_string(&packet.body),
                    canonical_string(&packet.footer.to_value()),
                    packet.footer.hash.to_hex(),
                    HashAlgorithm::Sha256.name(),
                    CANONICAL_FORM,
                    now_millis(),
                ],
            )?;

            for geoid in &secondary {
                tx.execute(
                    "INSERT INTO packet_geoids (packet_id, geoid) VALUES (?1, ?2)",
                    params![id, geoid.as_str()],
                )?;
            }

            tx.commit()?;
            debug!(packet_id = %id, secondary = secondary.len(), "packet row written");
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_packet(&self, id: &PacketId) -> Result<Option<Packet>> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT header, body, footer FROM packets WHERE packet_id = ?1",
                params![id],
                row_to_packet,
            )
            .optional()?
            .map(decode_packet)
            .transpose()
        })
        .await
    }

    async fn has_packet(&self, id: &PacketId) -> Result<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM packets WHERE packet_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn packet_geoids(&self, id: &PacketId) -> Result<Vec<GeoId>> {
        let id = id.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare("SELECT geoid FROM packet_geoids WHERE packet_id = ?1 ORDER BY geoid")?;
            let geoids = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))?
                .map(|r| r.map(GeoId::new))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(geoids)
        })
        .await
    }

    async fn query_packets(&self, query: &PacketQuery) -> Result<Page<Packet>> {
        let limit = query
            .validate()
            .map_err(|e| StoreError::BadRequest(e.to_string()))?;
        if query.thread_ids.as_ref().is_some_and(|t| t.is_empty()) {
            return Ok(Page::empty());
        }
        let query = query.clone();

        self.run(move |conn| {
            let filter = build_query(conn, &query, limit)?;
            debug!(sql = %filter.sql, args = filter.args.len(), "query_packets");

            let mut stmt = conn.prepare(&filter.sql)?;
            let rows = stmt
                .query_map(params_from_iter(filter.args.iter()), row_to_packet)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let packets = rows
                .into_iter()
                .map(decode_packet)
                .collect::<Result<Vec<_>>>()?;

            Ok(Page::from_probe(packets, limit, Packet::id))
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_ledger(&self, ledger: &Ledger, first: Option<&LedgerEntry>) -> Result<()> {
        let ledger = ledger.clone();
        let first = first.cloned();

        self.run(move |conn| {
            let id = ledger.ledger_id.to_string();
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM ledgers WHERE ledger_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Conflict(format!("ledger {} already exists", id)));
            }

            tx.execute(
                "INSERT INTO ledgers (
                    ledger_id, ledger_type, status, revision, root, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    ledger.ledger_type,
                    status_name(ledger.status),
                    ledger.revision as i64,
                    encode_root(&ledger)?,
                    ledger.created_at.timestamp_millis(),
                    ledger.updated_at.timestamp_millis(),
                ],
            )?;
            write_participants(&tx, &ledger)?;
            if let Some(entry) = &first {
                write_entry(&tx, entry)?;
            }

            tx.commit()?;
            debug!(ledger_id = %id, "ledger row written");
            Ok(())
        })
        .await
    }

    async fn update_ledger(
        &self,
        ledger: &Ledger,
        entry: Option<&LedgerEntry>,
        expected_revision: u64,
    ) -> Result<()> {
        let ledger = ledger.clone();
        let entry = entry.cloned();

        self.run(move |conn| {
            let id = ledger.ledger_id.to_string();
            let tx = conn.transaction()?;

            let actual: i64 = tx
                .query_row(
                    "SELECT revision FROM ledgers WHERE ledger_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("ledger {}", id)))?;
            if actual as u64 != expected_revision {
                return Err(StoreError::StaleRevision {
                    ledger_id: id,
                    expected: expected_revision,
                    actual: actual as u64,
                });
            }

            tx.execute(
                "UPDATE ledgers
                 SET status = ?2, revision = ?3, root = ?4, updated_at = ?5
                 WHERE ledger_id = ?1",
                params![
                    id,
                    status_name(ledger.status),
                    ledger.revision as i64,
                    encode_root(&ledger)?,
                    ledger.updated_at.timestamp_millis(),
                ],
            )?;
            write_participants(&tx, &ledger)?;
            if let Some(entry) = &entry {
                write_entry(&tx, entry)?;
            }

            tx.commit()?;
            debug!(ledger_id = %id, revision = ledger.revision, "ledger row updated");
            Ok(())
        })
        .await
    }

    async fn get_ledger(&self, id: &LedgerId) -> Result<Option<Ledger>> {
        let id = id.to_string();
        self.run(move |conn| {
            let root: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT root FROM ledgers WHERE ledger_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            root.as_deref().map(decode_root).transpose()
        })
        .await
    }

    async fn get_entries(&self, id: &LedgerId) -> Result<Vec<LedgerEntry>> {
        let id = id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record FROM ledger_entries WHERE ledger_id = ?1 ORDER BY sequence_number",
            )?;
            let records = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            records
                .iter()
                .map(|r| serde_json::from_str(r).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn list_ledgers(&self, participant: Option<&str>) -> Result<Vec<Ledger>> {
        let participant = participant.map(str::to_string);
        self.run(move |conn| {
            let roots: Vec<Vec<u8>> = match &participant {
                Some(agent_id) => {
                    let mut stmt = conn.prepare(
                        "SELECT l.root FROM ledgers l
                         JOIN ledger_participants p ON p.ledger_id = l.ledger_id
                         WHERE p.agent_id = ?1
                         ORDER BY l.ledger_id",
                    )?;
                    let rows = stmt
                        .query_map(params![agent_id], |row| row.get(0))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare("SELECT root FROM ledgers ORDER BY ledger_id")?;
                    let rows = stmt
                        .query_map([], |row| row.get(0))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
            };
            roots.iter().map(|r| decode_root(r)).collect()
        })
        .await
    }
}
