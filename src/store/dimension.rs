use std::collections::HashMap;

use log::debug;
use rusqlite::{Transaction, params};

use super::StoreResult;

/// Returns the `ciudad_id` for `name`, creating the row the first time the name is seen.
///
/// The insert ignores a uniqueness conflict, so a row created concurrently by
/// another writer is simply picked up by the lookup that follows.
pub fn resolve_city_id(tx: &Transaction<'_>, name: &str) -> StoreResult<i64> {
    let created = tx.execute(
        "INSERT OR IGNORE INTO ciudades (nombre) VALUES (?1)",
        params![name],
    )?;
    if created > 0 {
        debug!("Registered city '{name}'");
    }
    let id = tx.query_row(
        "SELECT ciudad_id FROM ciudades WHERE nombre = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Memoizes city ids for the duration of one load.
#[derive(Debug, Default)]
pub struct CityResolver {
    cache: HashMap<String, i64>,
}

impl CityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, tx: &Transaction<'_>, name: &str) -> StoreResult<i64> {
        if let Some(id) = self.cache.get(name) {
            return Ok(*id);
        }
        let id = resolve_city_id(tx, name)?;
        self.cache.insert(name.to_string(), id);
        Ok(id)
    }

    /// Distinct city names resolved so far.
    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}
