pub mod cli;
pub mod config;
pub mod io_utils;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod store;
pub mod table;
pub mod transform;

use std::{env, fs, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{BatchArgs, Cli, Commands, LoadArgs, ReportArgs},
    config::PipelineConfig,
    store::Store,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("people_etl", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Batch(args) => handle_batch(&args),
        Commands::Report(args) => handle_report(&args),
    }
}

fn handle_load(args: &LoadArgs) -> Result<()> {
    let config = PipelineConfig::resolve(
        args.options.config.as_deref(),
        args.options.overrides(args.source.clone()),
    )?;
    debug!("Pipeline config: {:?}", config);
    let rejected_path = args
        .rejected
        .clone()
        .unwrap_or_else(|| io_utils::rejected_path_for(&args.input, None));

    let mut store =
        Store::open(&args.db).with_context(|| format!("Opening database {:?}", args.db))?;
    let report = pipeline::process_file(&mut store, &args.input, &rejected_path, &config)?;
    store
        .close()
        .with_context(|| format!("Closing database {:?}", args.db))?;

    let summary = &report.summary;
    info!(
        "run_id={} source={} valid={} rejected={} inserted_new={} ignored_duplicates={}",
        summary.run_id,
        summary.source_file,
        summary.valid_count,
        summary.rejected_count,
        summary.inserted_new,
        summary.ignored_duplicates
    );
    if let Some(path) = &args.summary_json {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("Writing run summary to {path:?}"))?;
    }
    Ok(())
}

fn handle_batch(args: &BatchArgs) -> Result<()> {
    if !args.input_dir.is_dir() {
        return Err(anyhow!("Input directory {:?} does not exist", args.input_dir));
    }
    let config =
        PipelineConfig::resolve(args.options.config.as_deref(), args.options.overrides(None))?;
    let rejected_dir = args
        .rejected_dir
        .clone()
        .unwrap_or_else(|| args.input_dir.join("rejected"));

    let mut store =
        Store::open(&args.db).with_context(|| format!("Opening database {:?}", args.db))?;
    let reports = pipeline::process_directory(&mut store, &args.input_dir, &rejected_dir, &config)?;
    store
        .close()
        .with_context(|| format!("Closing database {:?}", args.db))?;

    for report in &reports {
        let summary = &report.summary;
        info!(
            "{}: valid={} rejected={} inserted_new={} ignored_duplicates={} run_id={}",
            summary.source_file,
            summary.valid_count,
            summary.rejected_count,
            summary.inserted_new,
            summary.ignored_duplicates,
            summary.run_id
        );
    }
    Ok(())
}

fn handle_report(args: &ReportArgs) -> Result<()> {
    if !args.db.exists() {
        return Err(anyhow!("Database {:?} does not exist", args.db));
    }
    let mut store =
        Store::open(&args.db).with_context(|| format!("Opening database {:?}", args.db))?;
    store
        .ensure_schema()
        .with_context(|| format!("Preparing schema in {:?}", args.db))?;
    let text = report::render_report(store.conn(), args.run.as_deref(), args.limit)?;
    print!("{text}");
    store.close()?;
    Ok(())
}
