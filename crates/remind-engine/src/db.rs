//! SQLite-backed event journal and snapshot store.
//!
//! Events and snapshots are JSON rows keyed by `(persistence_id, seq)`.
//! One [`SqliteStore`] serves both seams and can be shared (cloned) between
//! the journal and snapshot roles of a single engine, or across engines
//! with distinct persistence ids.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use remind_core::{Event, ReminderError, Result, State};
use rusqlite::Connection;

use crate::journal::{EventJournal, SnapshotStore};

/// Initialise the reminder schema in `conn`. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            persistence_id  TEXT    NOT NULL,
            seq             INTEGER NOT NULL,
            payload         TEXT    NOT NULL,   -- JSON-encoded Event
            PRIMARY KEY (persistence_id, seq)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS snapshots (
            persistence_id  TEXT    NOT NULL,
            seq             INTEGER NOT NULL,   -- log seq the snapshot covers
            payload         TEXT    NOT NULL,   -- JSON-encoded State
            PRIMARY KEY (persistence_id, seq)
        ) STRICT;
        ",
    )
}

/// Durable store for reminder events and snapshots.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// Private in-process database, mostly useful in tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    pub fn with_connection(conn: Connection) -> Result<Self> {
        init_db(&conn).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl EventJournal for SqliteStore {
    async fn append(&self, persistence_id: &str, seq: u64, event: &Event) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events (persistence_id, seq, payload) VALUES (?1, ?2, ?3)",
            rusqlite::params![persistence_id, seq, payload],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn replay(&self, persistence_id: &str, from_seq: u64) -> Result<Vec<(u64, Event)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT seq, payload FROM events
                 WHERE persistence_id = ?1 AND seq > ?2
                 ORDER BY seq",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![persistence_id, from_seq], |row| {
                Ok((row.get::<_, u64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut events = Vec::with_capacity(rows.len());
        for (seq, payload) in rows {
            let event: Event = serde_json::from_str(&payload).map_err(|e| {
                ReminderError::Persistence(format!("corrupt event payload at seq {seq}: {e}"))
            })?;
            events.push((seq, event));
        }
        Ok(events)
    }

    async fn truncate(&self, persistence_id: &str, up_to_seq: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM events WHERE persistence_id = ?1 AND seq <= ?2",
            rusqlite::params![persistence_id, up_to_seq],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn save(&self, persistence_id: &str, seq: u64, state: &State) -> Result<()> {
        let payload = serde_json::to_string(state)?;
        let conn = self.conn.lock().unwrap();
        // replace: re-snapshotting the same seq after a restart is legal
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (persistence_id, seq, payload)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![persistence_id, seq, payload],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_latest(&self, persistence_id: &str) -> Result<Option<(u64, State)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT seq, payload FROM snapshots
                 WHERE persistence_id = ?1
                 ORDER BY seq DESC LIMIT 1",
            )
            .map_err(db_err)?;
        let row = stmt
            .query_map(rusqlite::params![persistence_id], |row| {
                Ok((row.get::<_, u64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?
            .next()
            .transpose()
            .map_err(db_err)?;

        match row {
            None => Ok(None),
            Some((seq, payload)) => {
                let state: State = serde_json::from_str(&payload).map_err(|e| {
                    ReminderError::Persistence(format!("corrupt snapshot at seq {seq}: {e}"))
                })?;
                Ok(Some((seq, state)))
            }
        }
    }
}

fn db_err(e: rusqlite::Error) -> ReminderError {
    ReminderError::Persistence(e.to_string())
}
