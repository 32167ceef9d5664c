// stateflow-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite History Store
// Description: Durable HistoryStore backed by SQLite WAL.
// Purpose: Persist execution log records under an exclusive writer.
// Dependencies: rusqlite, serde, serde_json, stateflow-core, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`HistoryStore`] using `SQLite`. The
//! database is opened in create-if-missing, read-write mode; every record is
//! an append-only row keyed by its history item id. Writes serialize through
//! one mutex-guarded connection; readers open a separate read-only handle.
//! Loads fail closed on schema mismatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params;
use serde::Deserialize;
use stateflow_core::HistoryItemId;
use stateflow_core::HistoryStore;
use stateflow_core::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` history store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with defaults for a database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` history store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database access failed.
    #[error("sqlite error: {0}")]
    Sqlite(String),
    /// The store was closed.
    #[error("sqlite store is closed")]
    Closed,
    /// The database schema version is newer than this store.
    #[error("sqlite schema version mismatch: found {0}")]
    VersionMismatch(i64),
    /// A record payload did not serialize.
    #[error("record serialization failed: {0}")]
    Serialize(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(err.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Closed => Self::Closed,
            SqliteStoreError::VersionMismatch(found) => {
                Self::Corrupt(format!("schema version mismatch: {found}"))
            }
            SqliteStoreError::Sqlite(reason) => Self::Io(reason),
            SqliteStoreError::Serialize(reason) => Self::Store(reason),
        }
    }
}

// ============================================================================
// SECTION: SQLite Store
// ============================================================================

/// Durable history store backed by one `SQLite` database file.
pub struct SqliteHistoryStore {
    /// Writer connection; `None` once closed.
    conn: Mutex<Option<Connection>>,
}

impl SqliteHistoryStore {
    /// Opens (or creates) the database in read-write mode.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// migrated.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "journal_mode", config.journal_mode.pragma_value())?;
        conn.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS history_items (
                    history_item_id TEXT PRIMARY KEY,
                    record TEXT NOT NULL
                );",
            )?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else if version != SCHEMA_VERSION {
            return Err(SqliteStoreError::VersionMismatch(version));
        }
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Opens an existing database read-only for analysis tools.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened.
    pub fn open_read_only(path: &Path) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != SCHEMA_VERSION {
            return Err(SqliteStoreError::VersionMismatch(version));
        }
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Returns every stored record keyed by history item id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when reading fails or a record does not
    /// parse.
    pub fn records(&self) -> Result<BTreeMap<String, serde_json::Value>, SqliteStoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(SqliteStoreError::Closed)?;
        let mut statement =
            conn.prepare("SELECT history_item_id, record FROM history_items")?;
        let rows = statement.query_map([], |row| {
            let key: String = row.get(0)?;
            let record: String = row.get(1)?;
            Ok((key, record))
        })?;
        let mut records = BTreeMap::new();
        for row in rows {
            let (key, record) = row?;
            let value: serde_json::Value = serde_json::from_str(&record)
                .map_err(|err| SqliteStoreError::Serialize(err.to_string()))?;
            records.insert(key, value);
        }
        Ok(records)
    }

    /// Locks the connection slot, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn put(&self, key: &HistoryItemId, record: &serde_json::Value) -> Result<(), StoreError> {
        let rendered = serde_json::to_string(record)
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        conn.execute(
            "INSERT OR REPLACE INTO history_items (history_item_id, record) VALUES (?1, ?2)",
            params![key.as_str(), rendered],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.lock();
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, err)| StoreError::Io(err.to_string()))?;
        }
        Ok(())
    }
}
