//! SQLite persistence layer for per-application rule overrides.
//!
//! Uses `rusqlite` with bundled SQLite. One `overrides` table keyed by
//! `(category, package)` realizes the five independent sparse namespaces;
//! absence of a row means "use the computed default."

mod overrides;

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::Connection;

/// Manages the SQLite database holding override deltas.
///
/// All operations lock the single connection, so writes to the same key are
/// serialized and each write is atomic as observed by concurrent readers.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests and tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS overrides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                package TEXT NOT NULL,
                value INTEGER NOT NULL,
                UNIQUE(category, package)
            );
            CREATE INDEX IF NOT EXISTS idx_overrides_category ON overrides(category);
            ",
        )?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}
