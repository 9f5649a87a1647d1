//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, DatabaseName};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::LocationRecord;
use crate::schema;

/// SQLite-based store for location history.
///
/// One instance owns the connection for the lifetime of the process. Appends
/// commit individually, so an interrupted run loses at most the message that
/// was in flight. [`Store::snapshot`] uses SQLite's online backup API and can
/// run while appends continue on another handle to the same file.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL keeps appends and online backups from blocking each other
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        // Initialize schema
        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Append one location update.
    ///
    /// The row's `time` column is assigned here, at insert, not taken from
    /// the caller. Each append is its own transaction and is durable once
    /// this returns. Failures are reported per call and never retried by the
    /// store; the caller decides whether to drop the message.
    pub fn append(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        self.conn.execute(
            "INSERT INTO location_data (topic, time, payload) VALUES (?1, ?2, ?3)",
            rusqlite::params![topic, now, payload],
        )?;

        debug!("Appended {} byte(s) for {}", payload.len(), topic);
        Ok(())
    }

    /// Write a consistent point-in-time copy of the store to `destination`.
    ///
    /// Uses SQLite's online backup, so concurrent appends neither corrupt the
    /// copy nor get blocked. The copy is a standalone database file.
    pub fn snapshot<P: AsRef<Path>>(&self, destination: P) -> Result<()> {
        let destination = destination.as_ref();

        info!("Backing up database to {}", destination.display());
        self.conn.backup(DatabaseName::Main, destination, None)?;

        Ok(())
    }

    /// Count stored records.
    pub fn count_records(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM location_data", [], |row| row.get(0))?;

        Ok(count as u64)
    }

    /// Read back all records in insertion order.
    ///
    /// Diagnostics only; the table carries no indexes and this walks all of
    /// it.
    pub fn records(&self) -> Result<Vec<LocationRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT topic, time, payload FROM location_data ORDER BY rowid")?;

        let records = stmt
            .query_map([], |row| {
                Ok(LocationRecord {
                    topic: row.get(0)?,
                    recorded_at: OffsetDateTime::from_unix_timestamp(row.get(1)?).unwrap(),
                    payload: row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Close the store, releasing the underlying connection.
    ///
    /// Consumes the store: once closed, no further appends are possible on
    /// this handle.
    pub fn close(self) -> Result<()> {
        info!("Closing database");
        self.conn.close().map_err(|(_conn, e)| Error::Database(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
    }

    #[test]
    fn test_append_and_read_back() {
        let start = OffsetDateTime::now_utc().unix_timestamp();
        let store = Store::open_in_memory().unwrap();

        store.append("owntracks/phone1", b"loc-A").unwrap();
        store.append("owntracks/phone1", b"loc-B").unwrap();

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].topic, "owntracks/phone1");
        assert_eq!(records[1].topic, "owntracks/phone1");
        assert_eq!(records[0].payload, b"loc-A");
        assert_eq!(records[1].payload, b"loc-B");
        assert!(records[0].recorded_at.unix_timestamp() >= start);
        assert!(records[1].recorded_at >= records[0].recorded_at);
    }

    #[test]
    fn test_append_binary_payload() {
        let store = Store::open_in_memory().unwrap();

        let payload = [0u8, 0xff, 0x80, b'{', 0x01];
        store.append("owntracks/phone1", &payload).unwrap();

        let records = store.records().unwrap();
        assert_eq!(records[0].payload, payload);
    }

    #[test]
    fn test_appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.db");

        let store = Store::open(&path).unwrap();
        for i in 0..25 {
            store
                .append("owntracks/phone1", format!("loc-{}", i).as_bytes())
                .unwrap();
        }
        store.close().unwrap();

        let store = Store::open(&path).unwrap();
        let records = store.records().unwrap();
        assert_eq!(records.len(), 25);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.payload, format!("loc-{}", i).as_bytes());
        }
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.db");

        let store = Store::open(&path).unwrap();
        store.append("owntracks/phone1", b"loc-A").unwrap();
        drop(store);

        // Second open must not re-create or disturb the schema
        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_records().unwrap(), 1);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("locations.db");

        let store = Store::open(&path).unwrap();
        store.append("owntracks/phone1", b"loc-A").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_snapshot_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.db");
        let snapshot_path = dir.path().join("backup.sqlite");

        let store = Store::open(&path).unwrap();
        for i in 0..10 {
            store
                .append("owntracks/phone1", format!("loc-{}", i).as_bytes())
                .unwrap();
        }

        store.snapshot(&snapshot_path).unwrap();

        let copy = Store::open(&snapshot_path).unwrap();
        assert_eq!(copy.records().unwrap(), store.records().unwrap());
    }

    #[test]
    fn test_snapshot_isolation_under_concurrent_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.db");
        let snapshot_path = dir.path().join("backup.sqlite");

        let store = Store::open(&path).unwrap();
        for _ in 0..10 {
            store.append("owntracks/phone1", b"before").unwrap();
        }

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            let writer_store = Store::open(&writer_path).unwrap();
            for _ in 0..50 {
                // The backup may briefly hold the database busy; keep trying
                // until this append lands.
                while writer_store.append("owntracks/phone2", b"during").is_err() {}
            }
        });

        store.snapshot(&snapshot_path).unwrap();
        writer.join().unwrap();

        // Live store has everything
        assert_eq!(store.count_records().unwrap(), 60);

        // The snapshot is a valid database whose row count falls between the
        // pre- and post-snapshot live counts
        let copy = Store::open(&snapshot_path).unwrap();
        let copied = copy.count_records().unwrap();
        assert!((10..=60).contains(&copied), "snapshot had {} rows", copied);
    }

    #[test]
    fn test_repeated_snapshots_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.db");
        let snapshot_path = dir.path().join("backup.sqlite");

        let store = Store::open(&path).unwrap();
        store.append("owntracks/phone1", b"loc-A").unwrap();
        store.snapshot(&snapshot_path).unwrap();

        store.append("owntracks/phone1", b"loc-B").unwrap();
        store.snapshot(&snapshot_path).unwrap();

        let copy = Store::open(&snapshot_path).unwrap();
        assert_eq!(copy.count_records().unwrap(), 2);
    }

    #[test]
    fn test_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.db");

        let store = Store::open(&path).unwrap();
        store.append("owntracks/phone1", b"loc-A").unwrap();
        store.close().unwrap();

        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_records().unwrap(), 1);
    }
}
