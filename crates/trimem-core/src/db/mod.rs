//! SQLite reference adapters for the three memory stores.
//!
//! Each adapter owns its own [`Database`] so that, like the production
//! stores they stand in for, one can fail without taking the others down.
//!
//! - [`SqliteFactStore`]: `facts` table keyed by `(owner_id, key)`
//! - [`SqliteEpisodeStore`]: `episodes` table with embedding blobs, ranked
//!   by exhaustive cosine distance
//! - [`SqliteGraphStore`]: `graph_nodes` / `graph_edges` with breadth-first
//!   path queries

mod episodes;
mod facts;
mod graph;

pub use episodes::SqliteEpisodeStore;
pub use facts::SqliteFactStore;
pub use graph::SqliteGraphStore;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{Error, Result};

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file, creating parent directories.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    pub(crate) fn migrate(&self, schema: &str) -> Result<()> {
        self.lock()?.execute_batch(schema)?;
        Ok(())
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Millisecond cutoff for a `since_days` window ending now.
///
/// `None` when the window reaches past the earliest representable time, in
/// which case nothing is cut off.
pub(crate) fn cutoff_millis(since_days: u32) -> Option<i64> {
    chrono::Duration::try_days(i64::from(since_days))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .map(to_millis)
}
