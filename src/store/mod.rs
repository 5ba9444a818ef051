//! SQLite persistence for the loader.
//!
//! A [`Store`] owns the single connection used by a run. Components receive a
//! borrowed [`rusqlite::Transaction`] from [`Store::with_transaction()`], so
//! every write of a step either commits together or rolls back together.
//!
//! - [`schema`]: table creation and legacy layout migration.
//! - [`dimension`]: city name to `ciudad_id` resolution.
//! - [`loader`]: duplicate-safe person inserts.
//! - [`audit`]: run identifiers and the `etl_runs` ledger.

pub mod audit;
pub mod dimension;
pub mod loader;
pub mod schema;

use std::path::{Path, PathBuf};

use log::{debug, info};
use rusqlite::{Connection, Transaction};
use thiserror::Error;

pub const CITY_TABLE: &str = "ciudades";
pub const PERSON_TABLE: &str = "personas_limpias";
pub const RUN_TABLE: &str = "etl_runs";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Table '{table}' has an unrecognized layout (columns: {columns})")]
    UnrecognizedLayout { table: String, columns: String },

    #[error(
        "Legacy table '{table}' holds {count} row(s) with NULL key columns; refusing to migrate"
    )]
    IncompleteLegacyRows { table: String, count: i64 },

    #[error(
        "Legacy table '{table}' holds {count} row(s) whose ciudad_id has no city \
         (first: {first_ids}); refusing to migrate"
    )]
    DanglingCityRefs {
        table: String,
        count: i64,
        first_ids: String,
    },

    #[error("Migration of '{table}' would drop {missing} row(s); rolled back")]
    MigrationVerification { table: String, missing: i64 },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One exclusive connection, held for the lifetime of a run or a batch of runs.
pub struct Store {
    conn: Connection,
    schema_ready: bool,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        debug!("Opening store at {:?}", path);
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            schema_ready: false,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside a transaction. Commits on `Ok`; the transaction is
    /// rolled back when it is dropped on the error path.
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Creates or migrates the schema once per connection.
    pub fn ensure_schema(&mut self) -> StoreResult<()> {
        if self.schema_ready {
            return Ok(());
        }
        let report = self.with_transaction(schema::ensure_schema)?;
        if let Some(migrated) = report.migrated_from {
            info!(
                "Migrated '{}' from {} layout ({} row(s) carried over)",
                PERSON_TABLE,
                migrated.describe(),
                report.rows_migrated
            );
        }
        self.schema_ready = true;
        Ok(())
    }

    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }
}
