//! CSV input and rejection-sink output.
//!
//! All file I/O of the pipeline flows through this module:
//!
//! - **Delimiter resolution**: `.tsv` → tab, everything else → comma, unless overridden.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8. Bytes that do
//!   not decode become U+FFFD so the row is rejected downstream instead of aborting the file.
//! - **Raw records**: header names are mapped to canonical field keys; short rows yield
//!   null values for the missing trailing fields.
//! - **stdin**: the `-` path reads standard input.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::{
    config::ColumnNames,
    record::{AGE_FIELD, CITY_FIELD, NAME_FIELD, RawRecord, RejectedRecord},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub const REJECTED_HEADERS: [&str; 4] = [NAME_FIELD, AGE_FIELD, CITY_FIELD, "reason"];

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn decode_lossy(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    let decoded = headers
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            if idx == 0 {
                // BOM sniffing on the first cell only
                encoding.decode(field).0.into_owned()
            } else {
                decode_lossy(field, encoding)
            }
        })
        .collect();
    Ok(decoded)
}

/// Reads every data row as a [`RawRecord`] keyed by canonical field names.
pub fn read_raw_records<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
    columns: &ColumnNames,
) -> Result<Vec<RawRecord>>
where
    R: Read,
{
    let headers = reader_headers(reader, encoding)?;
    let keys = headers
        .iter()
        .map(|h| columns.canonical_key(h).to_string())
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let mut raw = RawRecord::new();
        for (col_idx, key) in keys.iter().enumerate() {
            let value = record.get(col_idx).map(|field| decode_lossy(field, encoding));
            raw.insert(key.clone(), value);
        }
        records.push(raw);
    }
    Ok(records)
}

pub fn read_raw_records_from_path(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    columns: &ColumnNames,
) -> Result<Vec<RawRecord>> {
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    read_raw_records(&mut reader, encoding, columns).with_context(|| format!("Reading {path:?}"))
}

pub fn open_csv_writer(path: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DEFAULT_CSV_DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

/// Writes the rejection sink for one run. The header row is written even when empty.
pub fn write_rejected<W: Write>(
    writer: &mut csv::Writer<W>,
    rejected: &[RejectedRecord],
) -> Result<()> {
    writer.write_record(REJECTED_HEADERS)?;
    for record in rejected {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_rejected_to_path(path: &Path, rejected: &[RejectedRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !is_dash(path) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating rejected directory {parent:?}"))?;
        }
    }
    let mut writer = open_csv_writer(Some(path))?;
    write_rejected(&mut writer, rejected)
        .with_context(|| format!("Writing rejected rows to {path:?}"))
}

/// `rejected_<file name>` placed in `dir`, or next to the input when `dir` is `None`.
pub fn rejected_path_for(input: &Path, dir: Option<&Path>) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| n != "-")
        .unwrap_or_else(|| "stdin.csv".to_string());
    let target = format!("rejected_{file_name}");
    match dir.or_else(|| input.parent()) {
        Some(d) => d.join(target),
        None => PathBuf::from(target),
    }
}
