use log::{debug, warn};
use rusqlite::{Transaction, params};
use serde::Serialize;

use super::{StoreResult, dimension::CityResolver};
use crate::record::CanonicalRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    pub attempted: usize,
    pub inserted: usize,
    pub ignored: usize,
}

/// Inserts every record whose `(nombre, edad, ciudad_id)` is not stored yet.
///
/// `inserted` is the difference of the person row count around the batch,
/// which is only exact while no other writer touches the table.
pub fn load_records(
    tx: &Transaction<'_>,
    records: &[CanonicalRecord],
    run_id: &str,
    processed_at: &str,
) -> StoreResult<LoadCounts> {
    let before = person_count(tx)?;
    let mut resolver = CityResolver::new();
    let mut applied = 0usize;
    {
        let mut insert = tx.prepare_cached(
            "INSERT OR IGNORE INTO personas_limpias
                 (nombre, edad, ciudad_id, processed_at, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for record in records {
            let city_id = resolver.resolve(tx, &record.city)?;
            let changed = insert.execute(params![
                record.name,
                record.age,
                city_id,
                processed_at,
                run_id
            ])?;
            if changed == 0 {
                debug!(
                    "Skipping duplicate ({}, {}, {})",
                    record.name, record.age, record.city
                );
            }
            applied += changed;
        }
    }
    let after = person_count(tx)?;
    debug!("Resolved {} distinct city name(s)", resolver.len());

    let inserted = usize::try_from(after - before).unwrap_or(0);
    if inserted != applied {
        warn!(
            "Row count grew by {inserted} but {applied} insert(s) applied; \
             another writer may be active"
        );
    }
    Ok(LoadCounts {
        attempted: records.len(),
        inserted,
        ignored: records.len().saturating_sub(inserted),
    })
}

pub fn person_count(tx: &Transaction<'_>) -> StoreResult<i64> {
    Ok(tx.query_row("SELECT COUNT(*) FROM personas_limpias", [], |row| row.get(0))?)
}
