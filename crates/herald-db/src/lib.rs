//! SQLite persistence for Herald.
//!
//! One writer connection serializes all mutations; a small pool of
//! read-only connections serves queries so readers never queue behind a
//! write. WAL mode makes that split safe.

pub mod conversations;
pub mod error;
pub mod messages;
mod migrations;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod users;

pub use conversations::StartOutcome;
pub use error::StoreError;
pub use notifications::NotificationListing;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rusqlite::{Connection, OpenFlags};
use tracing::info;

const READER_POOL_SIZE: usize = 4;

/// Handle to the Herald database.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run
    /// migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let writer = Connection::open(path)?;

        // WAL so the read pool can run alongside the writer
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database open at {} (1 writer, {} readers)",
            path.display(),
            READER_POOL_SIZE
        );

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Run a read-only query on the next pooled reader.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("reader lock poisoned: {e}")))?;
        f(&conn)
    }

    /// Run a mutation (or transaction) on the writer connection.
    pub fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .writer
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("writer lock poisoned: {e}")))?;
        f(&conn)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Database;
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Open a throwaway database. Keep the `TempDir` alive as long as the
    /// `Database`; the WAL sidecar files live next to the main file.
    pub fn open_test_db() -> (TempDir, Database) {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::open(&dir.path().join("herald.db")).expect("open test db");
        (dir, db)
    }

    /// Insert a user with a throwaway password hash, returning its id.
    pub fn seed_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), username, "not-a-real-hash")
            .expect("seed user");
        id
    }
}
