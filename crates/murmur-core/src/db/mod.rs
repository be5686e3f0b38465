//! SQLite board database.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so feed reads proceed while a toggle holds the write lock
//! - `busy_timeout = 5s` so concurrent writers queue instead of failing outright
//! - `foreign_keys = ON` so deleting a post cascades to its reaction rows
//!
//! Every ledger mutation runs in a `BEGIN IMMEDIATE` transaction, which takes
//! the database write lock before the first read. Handlers in separate
//! processes sharing one database file therefore serialize their
//! check-and-mutate sequences.

pub mod migrations;
pub mod query;
pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StoreError;

/// Busy timeout used for board DB connections unless configured otherwise.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection options for [`SqliteStore::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// Explicitly opened persistence handle for one board database.
///
/// Opened once at startup and injected into [`crate::ledger::Ledger`]; the
/// connection closes when the store is dropped or [`SqliteStore::close`]d.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the board database at `path`, apply runtime pragmas,
    /// and migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring, or migrating the database
    /// fails.
    pub fn open(path: &Path, options: &StoreOptions) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        configure_connection(&conn, options)?;
        migrations::upgrade_board(&mut conn)?;
        tracing::debug!(path = %path.display(), "opened board database");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory board, migrated to the latest schema.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::upgrade_board(&mut conn)?;
        Ok(Self { conn, path: None })
    }

    /// Database file path, `None` for in-memory boards.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Underlying connection, for maintenance queries and tests.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the connection could not be closed cleanly.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }
}

fn configure_connection(conn: &Connection, options: &StoreOptions) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(options.busy_timeout)?;
    Ok(())
}
