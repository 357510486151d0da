//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Packets: one row per packet, sections stored as canonical JSON
        CREATE TABLE packets (
            packet_id TEXT PRIMARY KEY,       -- ULID, 26 chars
            geoid TEXT NOT NULL,              -- primary geoid
            packet_type TEXT NOT NULL,
            timestamp TEXT NOT NULL,          -- header timestamp exactly as hashed
            ts_millis INTEGER NOT NULL,       -- parsed timestamp, for ordering
            prev_packet_id TEXT,
            thread_id TEXT,                   -- Body.thread_id, if any
            search_text TEXT,                 -- lowercased Body.text / Body.message
            header TEXT NOT NULL,
            body TEXT NOT NULL,
            footer TEXT NOT NULL,
            packet_hash TEXT NOT NULL,        -- lowercase hex
            hash_algorithm TEXT NOT NULL,     -- e.g. 'SHA-256'
            canonical_form TEXT NOT NULL,     -- e.g. 'pancake-json-c14n/1'
            ingested_at INTEGER NOT NULL      -- local time of ingestion (Unix ms)
        );

        -- Secondary geo index: extra geoids a packet is filed under
        CREATE TABLE packet_geoids (
            packet_id TEXT NOT NULL REFERENCES packets(packet_id) ON DELETE CASCADE,
            geoid TEXT NOT NULL,
            PRIMARY KEY (packet_id, geoid)
        );

        -- Ledger roots
        CREATE TABLE ledgers (
            ledger_id TEXT PRIMARY KEY,
            ledger_type TEXT NOT NULL,
            status TEXT NOT NULL,             -- 'active' | 'archived'
            revision INTEGER NOT NULL,        -- optimistic concurrency key
            root BLOB NOT NULL,               -- CBOR-encoded root record
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE ledger_participants (
            ledger_id TEXT NOT NULL REFERENCES ledgers(ledger_id) ON DELETE CASCADE,
            agent_id TEXT NOT NULL,
            PRIMARY KEY (ledger_id, agent_id)
        );

        -- Ledger entries: the hash chain
        CREATE TABLE ledger_entries (
            entry_id TEXT PRIMARY KEY,
            ledger_id TEXT NOT NULL REFERENCES ledgers(ledger_id) ON DELETE CASCADE,
            sequence_number INTEGER NOT NULL,
            kind TEXT NOT NULL,               -- 'content' | 'reference'
            entry_hash TEXT NOT NULL,
            record TEXT NOT NULL,             -- JSON-encoded entry

            UNIQUE (ledger_id, sequence_number)
        );

        -- Indexes for common queries
        CREATE INDEX idx_packets_order ON packets(ts_millis DESC, packet_id DESC);
        CREATE INDEX idx_packets_geoid ON packets(geoid);
        CREATE INDEX idx_packets_type ON packets(packet_type);
        CREATE INDEX idx_packets_thread ON packets(thread_id);
        CREATE INDEX idx_packet_geoids_geoid ON packet_geoids(geoid);
        CREATE INDEX idx_participants_agent ON ledger_participants(agent_id);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "packets",
            "packet_geoids",
            "ledgers",
            "ledger_participants",
            "ledger_entries",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
