//! One pipeline run end to end, and directory batch mode.
//!
//! The order is fixed: extract, transform, write the rejection sink, ensure the
//! schema, then load and audit inside a single transaction. A run that fails
//! before the audit row is written leaves neither person rows nor a run row.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{
    config::PipelineConfig,
    io_utils,
    record::RawRecord,
    store::{
        Store, StoreResult,
        audit::{RunContext, RunSummary, format_timestamp, record_run},
        loader::{LoadCounts, load_records},
    },
    transform::{TransformCounts, TransformOutcome, transform_batch},
};

/// Loads the valid side of `outcome` and persists the run's audit row.
pub fn load_run(
    store: &mut Store,
    context: &RunContext,
    outcome: &TransformOutcome,
) -> StoreResult<(RunSummary, LoadCounts)> {
    store.ensure_schema()?;
    let processed_at = format_timestamp(Utc::now());
    let counts = outcome.counts();

    let (summary, load) = store.with_transaction(|tx| {
        let load = load_records(tx, &outcome.valid, &context.run_id, &processed_at)?;
        let summary = RunSummary {
            run_id: context.run_id.clone(),
            started_at: context.started_at_text(),
            source_file: context.source.clone(),
            valid_count: to_count(counts.valid),
            rejected_count: to_count(counts.rejected),
            inserted_new: to_count(load.inserted),
            ignored_duplicates: to_count(load.ignored),
        };
        record_run(tx, &summary)?;
        Ok::<_, crate::store::StoreError>((summary, load))
    })?;

    info!(
        "Run {} loaded: inserted {} new, ignored {} duplicate(s)",
        summary.run_id, summary.inserted_new, summary.ignored_duplicates
    );
    Ok((summary, load))
}

/// Transforms and loads an in-memory batch under a fresh run identifier.
pub fn run_records(
    store: &mut Store,
    source: &str,
    records: &[RawRecord],
    min_age: i64,
) -> StoreResult<RunReport> {
    let context = RunContext::start(source);
    let outcome = transform_batch(records, min_age);
    let (summary, load) = load_run(store, &context, &outcome)?;
    Ok(RunReport {
        summary,
        transform: outcome.counts(),
        load,
        rejected_path: None,
        outcome,
    })
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub transform: TransformCounts,
    pub load: LoadCounts,
    pub rejected_path: Option<PathBuf>,
    pub outcome: TransformOutcome,
}

#[derive(Debug, Serialize)]
struct RunReportJson<'a> {
    run: &'a RunSummary,
    transform: TransformCounts,
    load: LoadCounts,
    rejected_path: Option<String>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        let doc = RunReportJson {
            run: &self.summary,
            transform: self.transform,
            load: self.load,
            rejected_path: self
                .rejected_path
                .as_ref()
                .map(|p| p.display().to_string()),
        };
        serde_json::to_string_pretty(&doc).context("Serializing run summary")
    }
}

pub fn source_for(input: &Path, config: &PipelineConfig) -> String {
    if let Some(tag) = config.source_tag.as_deref().filter(|t| !t.trim().is_empty()) {
        return tag.trim().to_string();
    }
    if io_utils::is_dash(input) {
        return "stdin".to_string();
    }
    input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}

/// Runs the pipeline for one delimited file.
pub fn process_file(
    store: &mut Store,
    input: &Path,
    rejected_path: &Path,
    config: &PipelineConfig,
) -> Result<RunReport> {
    let source = source_for(input, config);
    let context = RunContext::start(&source);
    info!("Starting run {} for '{}'", context.run_id, source);

    let delimiter = io_utils::resolve_input_delimiter(input, config.delimiter);
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let raw = io_utils::read_raw_records_from_path(input, delimiter, encoding, &config.columns)?;

    let outcome = transform_batch(&raw, config.min_age);
    let transform = outcome.counts();
    info!(
        "Transformed {} row(s): {} valid, {} rejected (min age {})",
        transform.input, transform.valid, transform.rejected, config.min_age
    );

    io_utils::write_rejected_to_path(rejected_path, &outcome.rejected)?;
    info!(
        "Wrote {} rejected row(s) to {:?}",
        transform.rejected, rejected_path
    );

    let (summary, load) = load_run(store, &context, &outcome)
        .with_context(|| format!("Loading rows from {input:?}"))?;

    Ok(RunReport {
        summary,
        transform,
        load,
        rejected_path: Some(rejected_path.to_path_buf()),
        outcome,
    })
}

/// Every `*.csv` file directly under `dir`, in file-name order.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("Listing directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Reading entry in {dir:?}"))?
            .path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    Ok(files.into_iter().sorted().collect())
}

/// One run per file over a shared store session. Each file is its own source identifier.
pub fn process_directory(
    store: &mut Store,
    input_dir: &Path,
    rejected_dir: &Path,
    config: &PipelineConfig,
) -> Result<Vec<RunReport>> {
    let inputs = discover_inputs(input_dir)?;
    if inputs.is_empty() {
        return Err(anyhow!("No .csv files found in {input_dir:?}"));
    }
    let file_config = PipelineConfig {
        source_tag: None,
        ..config.clone()
    };
    let mut reports = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let rejected_path = io_utils::rejected_path_for(input, Some(rejected_dir));
        let report = process_file(store, input, &rejected_path, &file_config)?;
        reports.push(report);
    }
    info!(
        "Batch finished: {} file(s) from {:?}",
        reports.len(),
        input_dir
    );
    Ok(reports)
}

fn to_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
