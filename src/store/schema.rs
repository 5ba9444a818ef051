//! Schema creation and forward migration of the person table.
//!
//! The person table has been deployed in three shapes over time. The current
//! shape is detected from its column set ([`SchemaGeneration::detect()`]) and
//! older shapes are rewritten with a create-copy-drop-rename sequence inside
//! the caller's transaction. The copy uses `INSERT OR IGNORE` against the same
//! `UNIQUE(nombre, edad, ciudad_id)` constraint, and is verified before the old
//! table is dropped.

use itertools::Itertools;
use log::debug;
use rusqlite::{Transaction, params};

use super::{CITY_TABLE, PERSON_TABLE, StoreError, StoreResult};

pub const MIGRATION_PROCESSED_AT: &str = "1970-01-01T00:00:00Z";
pub const MIGRATION_RUN_ID: &str = "MIGRATION";

const MIGRATION_TABLE: &str = "personas_limpias_new";

const CITY_DDL: &str = "CREATE TABLE IF NOT EXISTS ciudades (
    ciudad_id INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre TEXT NOT NULL UNIQUE
)";

const RUN_DDL: &str = "CREATE TABLE IF NOT EXISTS etl_runs (
    run_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    source_file TEXT NOT NULL,
    valid_count INTEGER NOT NULL,
    rejected_count INTEGER NOT NULL,
    inserted_new INTEGER NOT NULL,
    ignored_duplicates INTEGER NOT NULL
)";

fn person_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    persona_id INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre TEXT NOT NULL,
    edad INTEGER NOT NULL,
    ciudad_id INTEGER NOT NULL REFERENCES {CITY_TABLE}(ciudad_id),
    processed_at TEXT NOT NULL,
    run_id TEXT NOT NULL,
    UNIQUE(nombre, edad, ciudad_id)
)"
    )
}

/// Layout of the person table as found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaGeneration {
    /// No person table yet.
    Absent,
    /// `(id, nombre, edad, ciudad TEXT)` with the city name stored inline.
    Flat,
    /// `(persona_id, nombre, edad, ciudad_id)` without audit columns.
    Relational,
    /// Current layout with `processed_at` and `run_id`.
    Audited,
}

impl SchemaGeneration {
    pub fn detect(tx: &Transaction<'_>) -> StoreResult<Self> {
        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![PERSON_TABLE],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(SchemaGeneration::Absent);
        }
        let columns = table_columns(tx, PERSON_TABLE)?;
        let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));

        if !(has("nombre") && has("edad")) {
            return Err(unrecognized(&columns));
        }
        if has("ciudad_id") {
            if has("processed_at") && has("run_id") {
                Ok(SchemaGeneration::Audited)
            } else {
                Ok(SchemaGeneration::Relational)
            }
        } else if has("ciudad") {
            Ok(SchemaGeneration::Flat)
        } else {
            Err(unrecognized(&columns))
        }
    }

    pub fn needs_migration(self) -> bool {
        matches!(self, SchemaGeneration::Flat | SchemaGeneration::Relational)
    }

    pub fn describe(self) -> &'static str {
        match self {
            SchemaGeneration::Absent => "absent",
            SchemaGeneration::Flat => "flat",
            SchemaGeneration::Relational => "relational",
            SchemaGeneration::Audited => "audited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub detected: SchemaGeneration,
    pub migrated_from: Option<SchemaGeneration>,
    pub rows_migrated: i64,
}

/// Ensures the city, person, and run tables exist in their current shape.
pub fn ensure_schema(tx: &Transaction<'_>) -> StoreResult<SchemaReport> {
    tx.execute_batch(CITY_DDL)?;

    let detected = SchemaGeneration::detect(tx)?;
    debug!("Detected '{}' layout: {}", PERSON_TABLE, detected.describe());
    let mut report = SchemaReport {
        detected,
        migrated_from: None,
        rows_migrated: 0,
    };
    if detected.needs_migration() {
        report.rows_migrated = migrate_person_table(tx, detected)?;
        report.migrated_from = Some(detected);
    }

    tx.execute_batch(&person_ddl(PERSON_TABLE))?;
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_personas_limpias_run_id ON personas_limpias (run_id)",
    )?;
    tx.execute_batch(RUN_DDL)?;
    Ok(report)
}

/// Rewrites a legacy person table into the current shape. Returns the row count afterwards.
pub fn migrate_person_table(tx: &Transaction<'_>, from: SchemaGeneration) -> StoreResult<i64> {
    let columns = table_columns(tx, PERSON_TABLE)?;
    let id_column = ["persona_id", "id"]
        .into_iter()
        .find(|candidate| columns.iter().any(|c| c.eq_ignore_ascii_case(candidate)));

    let (city_column, source, city_key) = match from {
        SchemaGeneration::Relational => ("ciudad_id", "personas_limpias o", "o.ciudad_id"),
        SchemaGeneration::Flat => (
            "ciudad",
            "personas_limpias o LEFT JOIN ciudades c ON c.nombre = o.ciudad",
            "c.ciudad_id",
        ),
        SchemaGeneration::Absent | SchemaGeneration::Audited => {
            return Ok(tx.query_row(&format!("SELECT COUNT(*) FROM {PERSON_TABLE}"), [], |row| {
                row.get(0)
            })?);
        }
    };

    let incomplete: i64 = tx.query_row(
        &format!(
            "SELECT COUNT(*) FROM {PERSON_TABLE}
             WHERE nombre IS NULL OR edad IS NULL OR {city_column} IS NULL"
        ),
        [],
        |row| row.get(0),
    )?;
    if incomplete > 0 {
        return Err(StoreError::IncompleteLegacyRows {
            table: PERSON_TABLE.to_string(),
            count: incomplete,
        });
    }

    if from == SchemaGeneration::Relational {
        check_city_refs(tx)?;
    }

    if from == SchemaGeneration::Flat {
        let registered = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {CITY_TABLE} (nombre)
                 SELECT DISTINCT ciudad FROM {PERSON_TABLE} ORDER BY ciudad"
            ),
            [],
        )?;
        debug!("Registered {registered} legacy city name(s)");
    }

    check_leftover_migration_table(tx)?;
    tx.execute_batch(&person_ddl(MIGRATION_TABLE))?;

    let (target_id, source_id) = match id_column {
        Some(col) => ("persona_id, ", format!("o.{col}, ")),
        None => ("", String::new()),
    };
    let copied = tx.execute(
        &format!(
            "INSERT OR IGNORE INTO {MIGRATION_TABLE}
                 ({target_id}nombre, edad, ciudad_id, processed_at, run_id)
             SELECT {source_id}o.nombre, o.edad, {city_key}, ?1, ?2
             FROM {source}"
        ),
        params![MIGRATION_PROCESSED_AT, MIGRATION_RUN_ID],
    )?;
    debug!("Copied {copied} row(s) into '{MIGRATION_TABLE}'");

    let missing: i64 = tx.query_row(
        &format!(
            "SELECT COUNT(*) FROM {source}
             WHERE NOT EXISTS (
                 SELECT 1 FROM {MIGRATION_TABLE} n
                 WHERE n.nombre = o.nombre AND n.edad = o.edad AND n.ciudad_id = {city_key}
             )"
        ),
        [],
        |row| row.get(0),
    )?;
    if missing > 0 {
        return Err(StoreError::MigrationVerification {
            table: PERSON_TABLE.to_string(),
            missing,
        });
    }

    tx.execute_batch(&format!(
        "DROP TABLE {PERSON_TABLE};
         ALTER TABLE {MIGRATION_TABLE} RENAME TO {PERSON_TABLE};"
    ))?;

    Ok(tx.query_row(&format!("SELECT COUNT(*) FROM {PERSON_TABLE}"), [], |row| row.get(0))?)
}

// Stores written without foreign key enforcement may point at cities that were never created.
fn check_city_refs(tx: &Transaction<'_>) -> StoreResult<()> {
    let mut stmt = tx.prepare(&format!(
        "SELECT DISTINCT o.ciudad_id FROM {PERSON_TABLE} o
         LEFT JOIN {CITY_TABLE} c ON c.ciudad_id = o.ciudad_id
         WHERE c.ciudad_id IS NULL
         ORDER BY o.ciudad_id"
    ))?;
    let dangling_ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if dangling_ids.is_empty() {
        return Ok(());
    }
    let count: i64 = tx.query_row(
        &format!(
            "SELECT COUNT(*) FROM {PERSON_TABLE} o
             LEFT JOIN {CITY_TABLE} c ON c.ciudad_id = o.ciudad_id
             WHERE c.ciudad_id IS NULL"
        ),
        [],
        |row| row.get(0),
    )?;
    Err(StoreError::DanglingCityRefs {
        table: PERSON_TABLE.to_string(),
        count,
        first_ids: dangling_ids.iter().take(5).join(", "),
    })
}

/// A leftover target table is only reused when it already has the current shape.
fn check_leftover_migration_table(tx: &Transaction<'_>) -> StoreResult<()> {
    let columns = table_columns(tx, MIGRATION_TABLE)?;
    if columns.is_empty() {
        return Ok(());
    }
    let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
    let current = ["persona_id", "nombre", "edad", "ciudad_id", "processed_at", "run_id"]
        .into_iter()
        .all(has);
    if current {
        debug!("Reusing leftover '{MIGRATION_TABLE}'");
        Ok(())
    } else {
        Err(StoreError::UnrecognizedLayout {
            table: MIGRATION_TABLE.to_string(),
            columns: columns.join(", "),
        })
    }
}

pub fn table_columns(tx: &Transaction<'_>, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = tx.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn unrecognized(columns: &[String]) -> StoreError {
    StoreError::UnrecognizedLayout {
        table: PERSON_TABLE.to_string(),
        columns: columns.join(", "),
    }
}
