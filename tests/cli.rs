mod common;

use assert_cmd::Command;
use common::{SCENARIO_CSV, TestWorkspace, count, read_csv};
use predicates::str::contains;
use rusqlite::Connection;

fn people_etl() -> Command {
    Command::cargo_bin("people-etl").expect("binary exists")
}

#[test]
fn load_writes_rejects_next_to_input_and_summary_json() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("personas.csv", SCENARIO_CSV);
    let db = workspace.db_path();
    let summary = workspace.path().join("summary.json");

    people_etl()
        .args([
            "load",
            "-i",
            input.to_str().unwrap(),
            "-d",
            db.to_str().unwrap(),
            "--summary-json",
            summary.to_str().unwrap(),
        ])
        .assert()
        .success();

    let rejected = read_csv(&workspace.path().join("rejected_personas.csv"));
    assert_eq!(rejected.len(), 3);

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(doc["run"]["inserted_new"], 2);
    assert_eq!(doc["run"]["rejected_count"], 2);
    assert_eq!(doc["load"]["ignored"], 0);

    let conn = Connection::open(&db).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM personas_limpias"), 2);
}

#[test]
fn min_age_and_source_flags_override_config_file() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("p.tsv", "nombre\tedad\tciudad\nNaomi\t23\tSan Juan\n");
    let config = workspace.write(
        "pipeline.yaml",
        "min_age: 30\nsource_tag: from-file\n\
         columns:\n  name: nombre\n  age: edad\n  city: ciudad\n",
    );
    let db = workspace.db_path();
    let rejected = workspace.path().join("out/rejected.csv");

    people_etl()
        .args([
            "load",
            "-i",
            input.to_str().unwrap(),
            "-d",
            db.to_str().unwrap(),
            "-r",
            rejected.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--min-age",
            "18",
            "--source",
            "nightly batch",
        ])
        .assert()
        .success();

    let conn = Connection::open(&db).unwrap();
    let (run_id, source): (String, String) = conn
        .query_row("SELECT run_id, source_file FROM etl_runs", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(source, "nightly batch");
    assert!(run_id.ends_with("Z_nightly_batch"));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM personas_limpias"), 1);
    assert_eq!(read_csv(&rejected).len(), 1);
}

#[test]
fn batch_then_report_lists_runs_and_cities() {
    let workspace = TestWorkspace::new();
    workspace.write("in/a.csv", SCENARIO_CSV);
    workspace.write("in/b.csv", "name,age,city\nana,33,león\n");
    let db = workspace.db_path();
    let input_dir = workspace.path().join("in");

    people_etl()
        .args([
            "batch",
            "--input-dir",
            input_dir.to_str().unwrap(),
            "-d",
            db.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert!(input_dir.join("rejected").join("rejected_a.csv").exists());

    people_etl()
        .args(["report", "-d", db.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("a.csv"))
        .stdout(contains("b.csv"))
        .stdout(contains("San Luis"))
        .stdout(contains("León"));
}

#[test]
fn unknown_encoding_fails_with_message() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("personas.csv", SCENARIO_CSV);
    let db = workspace.db_path();
    people_etl()
        .args([
            "load",
            "-i",
            input.to_str().unwrap(),
            "-d",
            db.to_str().unwrap(),
            "--input-encoding",
            "klingon",
        ])
        .assert()
        .failure()
        .stderr(contains("Unknown encoding 'klingon'"));
}

#[test]
fn report_on_missing_database_fails() {
    let workspace = TestWorkspace::new();
    people_etl()
        .args(["report", "-d", workspace.db_path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("does not exist"));
}
