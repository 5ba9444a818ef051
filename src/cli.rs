use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load people CSV files into SQLite without duplicates",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean, validate, and load one CSV file as a single audited run
    Load(LoadArgs),
    /// Load every CSV file in a directory, one run per file
    Batch(BatchArgs),
    /// Show recent runs, rows loaded by a run, and per-city totals
    Report(ReportArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunOptions {
    /// YAML file with pipeline settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Minimum accepted age (defaults to 25)
    #[arg(long = "min-age")]
    pub min_age: Option<i64>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

impl RunOptions {
    pub fn overrides(&self, source_tag: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            min_age: self.min_age,
            source_tag,
            delimiter: self.delimiter,
            input_encoding: self.input_encoding.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Input CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// SQLite database file
    #[arg(short = 'd', long = "db")]
    pub db: PathBuf,
    /// Rejected rows output (defaults to rejected_<input> next to the input)
    #[arg(short = 'r', long = "rejected")]
    pub rejected: Option<PathBuf>,
    /// Source identifier recorded on the run (defaults to the input file name)
    #[arg(long)]
    pub source: Option<String>,
    /// Write the run summary as JSON to this path
    #[arg(long = "summary-json")]
    pub summary_json: Option<PathBuf>,
    #[command(flatten)]
    pub options: RunOptions,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Directory holding the CSV files to load
    #[arg(long = "input-dir")]
    pub input_dir: PathBuf,
    /// SQLite database file
    #[arg(short = 'd', long = "db")]
    pub db: PathBuf,
    /// Directory for rejected_<file> outputs (defaults to <input-dir>/rejected)
    #[arg(long = "rejected-dir")]
    pub rejected_dir: Option<PathBuf>,
    #[command(flatten)]
    pub options: RunOptions,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// SQLite database file
    #[arg(short = 'd', long = "db")]
    pub db: PathBuf,
    /// Run whose rows to list (defaults to the most recent run)
    #[arg(long = "run")]
    pub run: Option<String>,
    /// Number of recent runs to list
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
