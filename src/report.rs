//! Console views over a loaded store: recent runs, the persons a run loaded,
//! and per-city aggregates.

use rusqlite::{Connection, params};

use crate::{
    store::{
        StoreResult,
        audit::{RunSummary, recent_runs},
    },
    table::{Align, Table},
};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPerson {
    pub person_id: i64,
    pub name: String,
    pub age: i64,
    pub city: String,
    pub processed_at: String,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityStats {
    pub city: String,
    pub people: i64,
    pub average_age: f64,
}

pub fn persons_for_run(conn: &Connection, run_id: &str) -> StoreResult<Vec<LoadedPerson>> {
    let mut stmt = conn.prepare(
        "SELECT p.persona_id, p.nombre, p.edad, c.nombre, p.processed_at, p.run_id
         FROM personas_limpias p
         JOIN ciudades c ON p.ciudad_id = c.ciudad_id
         WHERE p.run_id = ?1
         ORDER BY p.persona_id",
    )?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok(LoadedPerson {
                person_id: row.get(0)?,
                name: row.get(1)?,
                age: row.get(2)?,
                city: row.get(3)?,
                processed_at: row.get(4)?,
                run_id: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn city_stats(conn: &Connection) -> StoreResult<Vec<CityStats>> {
    let mut stmt = conn.prepare(
        "SELECT c.nombre, COUNT(*) AS total, AVG(p.edad)
         FROM personas_limpias p
         JOIN ciudades c ON p.ciudad_id = c.ciudad_id
         GROUP BY c.nombre
         ORDER BY total DESC, c.nombre",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CityStats {
                city: row.get(0)?,
                people: row.get(1)?,
                average_age: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn runs_table(runs: &[RunSummary]) -> Table {
    let mut table = Table::new([
        "run_id", "started_at", "source", "valid", "rejected", "inserted", "ignored",
    ]);
    for column in 3..7 {
        table = table.align(column, Align::Right);
    }
    for run in runs {
        table.push_row(vec![
            run.run_id.clone(),
            run.started_at.clone(),
            run.source_file.clone(),
            run.valid_count.to_string(),
            run.rejected_count.to_string(),
            run.inserted_new.to_string(),
            run.ignored_duplicates.to_string(),
        ]);
    }
    table
}

pub fn persons_table(persons: &[LoadedPerson]) -> Table {
    let mut table = Table::new(["id", "name", "age", "city", "processed_at"])
        .align(0, Align::Right)
        .align(2, Align::Right);
    for person in persons {
        table.push_row(vec![
            person.person_id.to_string(),
            person.name.clone(),
            person.age.to_string(),
            person.city.clone(),
            person.processed_at.clone(),
        ]);
    }
    table
}

pub fn city_table(stats: &[CityStats]) -> Table {
    let mut table = Table::new(["city", "people", "avg_age"])
        .align(1, Align::Right)
        .align(2, Align::Right);
    for row in stats {
        table.push_row(vec![
            row.city.clone(),
            row.people.to_string(),
            format!("{:.1}", row.average_age),
        ]);
    }
    table
}

/// Full text report. Without `run_id` the persons section shows the latest run.
pub fn render_report(conn: &Connection, run_id: Option<&str>, limit: usize) -> StoreResult<String> {
    let runs = recent_runs(conn, limit)?;
    let mut output = String::new();

    output.push_str("Runs\n");
    output.push_str(&runs_table(&runs).render());

    let selected = run_id
        .map(str::to_string)
        .or_else(|| runs.first().map(|r| r.run_id.clone()));
    if let Some(selected) = selected {
        let persons = persons_for_run(conn, &selected)?;
        output.push_str(&format!("\nRows loaded by {selected}\n"));
        output.push_str(&persons_table(&persons).render());
    }

    output.push_str("\nPeople per city\n");
    output.push_str(&city_table(&city_stats(conn)?).render());
    Ok(output)
}
