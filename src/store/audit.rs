//! Run identifiers and the `etl_runs` ledger.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::Serialize;

use super::StoreResult;

/// Identity and start time of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub source: String,
}

impl RunContext {
    pub fn start(source: &str) -> Self {
        Self::at(source, Utc::now())
    }

    pub fn at(source: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: make_run_id(source, started_at),
            started_at,
            source: source.to_string(),
        }
    }

    pub fn started_at_text(&self) -> String {
        format_timestamp(self.started_at)
    }
}

/// `YYYYMMDDTHHMMSS` plus microseconds, then the sanitized source tag.
pub fn make_run_id(source: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", at.format("%Y%m%dT%H%M%S%6fZ"), sanitize_source(source))
}

pub fn sanitize_source(source: &str) -> String {
    source
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { '_' })
        .collect()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub source_file: String,
    pub valid_count: i64,
    pub rejected_count: i64,
    pub inserted_new: i64,
    pub ignored_duplicates: i64,
}

const SELECT_RUN: &str = "SELECT run_id, started_at, source_file, valid_count, rejected_count,
        inserted_new, ignored_duplicates
 FROM etl_runs";

impl RunSummary {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            started_at: row.get(1)?,
            source_file: row.get(2)?,
            valid_count: row.get(3)?,
            rejected_count: row.get(4)?,
            inserted_new: row.get(5)?,
            ignored_duplicates: row.get(6)?,
        })
    }
}

/// Persists the final counters of a run. Runs are written once and never updated.
pub fn record_run(tx: &Transaction<'_>, summary: &RunSummary) -> StoreResult<()> {
    tx.execute(
        "INSERT INTO etl_runs
             (run_id, started_at, source_file, valid_count, rejected_count,
              inserted_new, ignored_duplicates)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            summary.run_id,
            summary.started_at,
            summary.source_file,
            summary.valid_count,
            summary.rejected_count,
            summary.inserted_new,
            summary.ignored_duplicates
        ],
    )?;
    Ok(())
}

pub fn fetch_run(conn: &Connection, run_id: &str) -> StoreResult<Option<RunSummary>> {
    let summary = conn
        .query_row(
            &format!("{SELECT_RUN} WHERE run_id = ?1"),
            params![run_id],
            RunSummary::from_row,
        )
        .optional()?;
    Ok(summary)
}

/// Most recent runs first.
pub fn recent_runs(conn: &Connection, limit: usize) -> StoreResult<Vec<RunSummary>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "{SELECT_RUN} ORDER BY started_at DESC, run_id DESC LIMIT ?1"
    ))?;
    let runs = stmt
        .query_map(params![limit], RunSummary::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::store::{Store, StoreError, schema::ensure_schema};

    fn at(micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::microseconds(i64::from(micros))
    }

    fn summary(run_id: &str) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            started_at: format_timestamp(at(0)),
            source_file: "personas.csv".to_string(),
            valid_count: 2,
            rejected_count: 2,
            inserted_new: 2,
            ignored_duplicates: 0,
        }
    }

    #[test]
    fn run_id_carries_microseconds_and_sanitized_source() {
        assert_eq!(
            make_run_id("data/in/personas crudas.csv", at(26_490)),
            "20240309T140507026490Z_data_in_personas_crudas_csv"
        );
    }

    #[test]
    fn runs_in_same_second_get_distinct_ids() {
        let first = RunContext::at("a.csv", at(1));
        let second = RunContext::at("a.csv", at(2));
        let other_source = RunContext::at("b.csv", at(1));
        assert_ne!(first.run_id, second.run_id);
        assert_ne!(first.run_id, other_source.run_id);
    }

    #[test]
    fn started_at_is_rfc3339_with_micros() {
        assert_eq!(
            RunContext::at("a.csv", at(5)).started_at_text(),
            "2024-03-09T14:05:07.000005+00:00"
        );
    }

    #[test]
    fn recorded_run_reads_back_and_cannot_be_recorded_twice() {
        let mut store = Store::open_in_memory().unwrap();
        store.with_transaction(ensure_schema).unwrap();
        let run = summary("20240309T140507000000Z_personas_csv");

        store.with_transaction(|tx| record_run(tx, &run)).unwrap();
        assert_eq!(fetch_run(store.conn(), &run.run_id).unwrap(), Some(run.clone()));

        let err = store
            .with_transaction(|tx| record_run(tx, &run))
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(recent_runs(store.conn(), 10).unwrap().len(), 1);
    }
}
