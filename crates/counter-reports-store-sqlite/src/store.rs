// crates/counter-reports-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Usage Store
// Description: Durable usage store backed by SQLite WAL.
// Purpose: Persist titles, raw requests, and aggregates transactionally.
// Dependencies: counter-reports-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module opens and initializes the `SQLite` database, owns the shared
//! connection, and implements [`UsageStore`] by wrapping each operation in a
//! `SQLite` transaction that commits on success and rolls back on error.
//! Database contents are untrusted: counters and identities are range-checked
//! when read back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use counter_reports_core::Domain;
use counter_reports_core::RawRequest;
use counter_reports_core::StoreError;
use counter_reports_core::TitleRecord;
use counter_reports_core::UsageStore;
use counter_reports_core::UsageTransaction;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::transaction::SqliteUsageTransaction;
use crate::transaction::encode_payload;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
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

/// Configuration for the `SQLite` usage store.
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
    /// Creates a configuration with default pragmas for `path`.
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

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or out-of-range values.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error into a store error.
pub(crate) fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed usage store with WAL support.
#[derive(Clone)]
pub struct SqliteUsageStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteUsageStore {
    /// Opens an `SQLite`-backed usage store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        info!(path = %config.path.display(), "sqlite usage store opened");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Records one raw request (the recorder boundary).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the day is not in the
    /// request month, the title is unknown or a rollup, or the title belongs
    /// to another domain than the request class. Returns
    /// [`SqliteStoreError::Corrupt`] when the stored title domain is not
    /// recognized.
    pub fn record_request(&self, request: &RawRequest) -> Result<(), SqliteStoreError> {
        request
            .period
            .check_day(request.day)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.lock()?;
        let domain: Option<String> = guard
            .query_row(
                "SELECT domain FROM titles WHERE title_id = ?1",
                params![request.title.to_storage()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        let domain = domain
            .ok_or_else(|| SqliteStoreError::Invalid(format!("unknown title {}", request.title)))?;
        let domain = Domain::parse(&domain)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown title domain {domain}")))?;
        let class_domain = request.class.domain();
        if request.title.is_rollup() || domain != class_domain {
            return Err(SqliteStoreError::Invalid(format!(
                "request class {} does not apply to title {}",
                request.class.as_str(),
                request.title
            )));
        }
        guard
            .execute(
                "INSERT INTO raw_requests (title_id, year, month, day, request_class, domain, \
                 publisher_involved, publication_year, in_aggregation) VALUES (?1, ?2, ?3, ?4, \
                 ?5, ?6, ?7, ?8, 0)",
                params![
                    request.title.to_storage(),
                    request.period.year(),
                    request.period.month(),
                    request.day,
                    request.class.as_str(),
                    class_domain.as_str(),
                    request.publisher_involved,
                    request.publication_year,
                ],
            )
            .map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Returns the number of raw requests still stored.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn raw_request_count(&self) -> Result<u64, SqliteStoreError> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM raw_requests", params![], |row| row.get(0))
            .map_err(db_error)?;
        u64::try_from(count)
            .map_err(|_| SqliteStoreError::Corrupt("negative request count".to_string()))
    }

    /// Locks the shared connection.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }
}

impl UsageStore for SqliteUsageStore {
    fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UsageTransaction) -> Result<T, E>,
    {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| StoreError::from(db_error(err)))?;
        let result = operation(&mut SqliteUsageTransaction::new(&tx));
        match result {
            Ok(value) => {
                tx.commit().map_err(|err| StoreError::from(db_error(err)))?;
                drop(guard);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "sqlite usage store rollback failed");
                }
                drop(guard);
                Err(err)
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Validates store paths against length limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.to_string_lossy();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version, then
/// makes sure the rollup titles exist.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS titles (
                    title_id INTEGER PRIMARY KEY,
                    domain TEXT NOT NULL,
                    name TEXT NOT NULL,
                    payload_json BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_titles_domain_name
                    ON titles (domain, name, title_id);
                CREATE TABLE IF NOT EXISTS raw_requests (
                    request_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title_id INTEGER NOT NULL,
                    year INTEGER NOT NULL,
                    month INTEGER NOT NULL,
                    day INTEGER NOT NULL,
                    request_class TEXT NOT NULL,
                    domain TEXT NOT NULL,
                    publisher_involved INTEGER NOT NULL,
                    publication_year INTEGER,
                    in_aggregation INTEGER NOT NULL DEFAULT 0,
                    FOREIGN KEY (title_id) REFERENCES titles(title_id)
                );
                CREATE INDEX IF NOT EXISTS idx_raw_requests_pending
                    ON raw_requests (in_aggregation, year, month, domain, publisher_involved, title_id);
                CREATE TABLE IF NOT EXISTS book_type_aggregates (
                    title_id INTEGER NOT NULL,
                    publisher_involved INTEGER NOT NULL,
                    year INTEGER NOT NULL,
                    month INTEGER NOT NULL,
                    full_requests INTEGER NOT NULL,
                    section_requests INTEGER NOT NULL,
                    PRIMARY KEY (title_id, publisher_involved, year, month),
                    FOREIGN KEY (title_id) REFERENCES titles(title_id)
                );
                CREATE TABLE IF NOT EXISTS journal_type_aggregates (
                    title_id INTEGER NOT NULL,
                    publisher_involved INTEGER NOT NULL,
                    year INTEGER NOT NULL,
                    month INTEGER NOT NULL,
                    total_requests INTEGER NOT NULL,
                    html_requests INTEGER NOT NULL,
                    pdf_requests INTEGER NOT NULL,
                    PRIMARY KEY (title_id, publisher_involved, year, month),
                    FOREIGN KEY (title_id) REFERENCES titles(title_id)
                );
                CREATE TABLE IF NOT EXISTS journal_pubyear_aggregates (
                    title_id INTEGER NOT NULL,
                    publisher_involved INTEGER NOT NULL,
                    year INTEGER NOT NULL,
                    month INTEGER NOT NULL,
                    publication_year INTEGER NOT NULL,
                    requests INTEGER NOT NULL,
                    PRIMARY KEY (title_id, publisher_involved, year, month, publication_year),
                    FOREIGN KEY (title_id) REFERENCES titles(title_id)
                );",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    for domain in Domain::ALL {
        let rollup = TitleRecord::rollup(domain);
        tx.execute(
            "INSERT OR IGNORE INTO titles (title_id, domain, name, payload_json) VALUES (?1, ?2, \
             ?3, ?4)",
            params![
                rollup.id.to_storage(),
                domain.as_str(),
                rollup.payload.name,
                encode_payload(&rollup.payload)?,
            ],
        )
        .map_err(db_error)?;
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}

