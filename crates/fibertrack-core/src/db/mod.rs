//! Database utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers do not block the writer
//! - `busy_timeout = 5s` to ride out transient lock contention
//! - `foreign_keys = ON` to keep links between projects, phases, steps, and
//!   tasks consistent

pub mod migrations;
pub mod query;
pub mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::ServiceError;

/// Busy timeout used for every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the database file, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open database {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply schema migrations")?;

    Ok(conn)
}

/// Open a read-only connection to an existing database file.
///
/// Readers share the writer's WAL, so they run alongside it and each other.
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("open reader {}", path.display()))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
        .context("configure reader busy timeout")?;
    Ok(conn)
}

/// Start a read transaction on `conn` and fix its snapshot.
///
/// SQLite defers the snapshot to the first read, so one is issued here;
/// every later query on `conn` sees the database as of this call until
/// the transaction ends.
///
/// # Errors
///
/// Returns an error if the transaction cannot be started.
pub fn pin_snapshot(conn: &Connection) -> Result<()> {
    conn.execute_batch("BEGIN DEFERRED")
        .context("begin read transaction")?;
    let _tables: i64 = conn
        .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))
        .context("pin read snapshot")?;
    Ok(())
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Shared handle to the fibertrack store.
///
/// Wraps a single connection behind a mutex so the handle is `Sync` and can
/// be shared by HTTP handlers. Every write goes through that connection.
/// File-backed handles can also hand out read-only connections for work
/// that should not hold the lock.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the database file at `path`, migrating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_connection(path)?),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a migrated in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory database")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        migrations::migrate(&mut conn).context("apply schema migrations")?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-configured connection. No migration is applied and
    /// no readers are available.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            path: None,
        }
    }

    /// File backing this handle; `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }


    /// Run `f` with shared access to the connection.
    ///
    /// # Errors
    ///
    /// Propagates whatever `f` returns.
    pub fn with_conn<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E> {
        f(&self.lock())
    }

    /// Run `f` with exclusive access, for operations that open a transaction.
    ///
    /// # Errors
    ///
    /// Propagates whatever `f` returns.
    pub fn with_conn_mut<T, E>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, E>,
    ) -> Result<T, E> {
        f(&mut self.lock())
    }

    // A panic while holding the lock leaves SQLite itself consistent: an
    // open transaction is rolled back when its guard drops.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Current time as RFC 3339 UTC text, the storage format for timestamps.
#[must_use]
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp column.
///
/// # Errors
///
/// Returns an error if the text is not RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("parse timestamp '{raw}'"))
}

/// Read an RFC 3339 column by name from a row.
pub(crate) fn timestamp_column(
    row: &rusqlite::Row<'_>,
    column: &str,
) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_timestamp_sql(&raw, row, column)
}

/// Read a nullable RFC 3339 column by name from a row.
pub(crate) fn optional_timestamp_column(
    row: &rusqlite::Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| parse_timestamp_sql(&raw, row, column))
        .transpose()
}

fn parse_timestamp_sql(
    raw: &str,
    row: &rusqlite::Row<'_>,
    column: &str,
) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|error| {
            let index = row.as_ref().column_index(column).unwrap_or_default();
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })
}

/// Check whether a table exists in the connected database.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )
        .context("check table exists")?;
    Ok(exists)
}

/// Fail with [`ServiceError::Configuration`] when `table` is missing.
///
/// # Errors
///
/// Returns `Configuration` for a missing table and `Storage` if the catalog
/// query itself fails.
pub fn require_table(conn: &Connection, table: &str) -> Result<(), ServiceError> {
    if table_exists(conn, table)? {
        return Ok(());
    }
    tracing::warn!(table, "required table missing, setup required");
    Err(ServiceError::Configuration {
        message: format!("The {table} table does not exist. Database setup is required."),
        details: Some(format!("missing table: {table}")),
    })
}
