use crate::columns;
use crate::error::{ImportError, Result};
use crate::models::{Record, RecordSet, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DELIMITER: u8 = b'|';

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Keep only rows whose `field` equals `equals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFilter {
    pub field: &'static str,
    pub equals: &'static str,
}

/// How a file is turned into a record set. Field names are canonical names.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub date_fields: &'static [&'static str],
    /// Columns to keep, in this order. `None` keeps every column.
    pub keep_columns: Option<&'static [&'static str]>,
    pub filter: Option<RowFilter>,
}

/// Returns `path` if it exists, else `<cwd>/<file name>` if that exists.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let file_name = path.file_name().map(PathBuf::from).unwrap_or_default();
    let fallback = std::env::current_dir()
        .map(|cwd| cwd.join(&file_name))
        .unwrap_or(file_name);

    if fallback.is_file() {
        debug!(path = %path.display(), fallback = %fallback.display(), "Using fallback path");
        return Ok(fallback);
    }

    Err(ImportError::FileNotFound {
        path: path.to_path_buf(),
        fallback,
    })
}

/// Loads a pipe-delimited file with a header row into a typed record set.
pub fn load(path: &Path, options: &LoadOptions) -> Result<RecordSet> {
    let resolved = resolve_path(path)?;
    let file = File::open(&resolved)
        .map_err(|e| ImportError::malformed(&resolved, None, format!("cannot open file: {e}")))?;

    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .from_reader(BufReader::with_capacity(128 * 1024, file));

    let headers = reader.headers().map_err(|e| csv_error(&resolved, e))?.clone();
    let raw: Vec<&str> = headers.iter().collect();
    let mut columns = columns::canonicalize(&columns::disambiguate(&raw));

    let mut rows: Vec<StringRecord> = Vec::new();
    for result in reader.records() {
        rows.push(result.map_err(|e| csv_error(&resolved, e))?);
    }

    if let Some(filter) = options.filter {
        let idx = require_column(&columns, filter.field, &resolved)?;
        rows.retain(|row| row.get(idx).map(str::trim) == Some(filter.equals));
    }

    let mut positions: Vec<usize> = (0..columns.len()).collect();
    if let Some(keep) = options.keep_columns {
        positions = keep
            .iter()
            .map(|name| require_column(&columns, name, &resolved))
            .collect::<Result<_>>()?;
        columns = keep.iter().map(|name| name.to_string()).collect();
    }

    for field in options.date_fields {
        if !columns.iter().any(|c| c == field) {
            debug!(field, path = %resolved.display(), "Date field not present, skipping");
        }
    }

    let kinds: Vec<ColumnKind> = positions
        .iter()
        .zip(&columns)
        .map(|(&pos, name)| {
            if options.date_fields.contains(&name.as_str()) {
                ColumnKind::Timestamp
            } else {
                infer_kind(&rows, pos)
            }
        })
        .collect();

    let records = rows
        .iter()
        .map(|row| {
            let values = positions
                .iter()
                .zip(&kinds)
                .map(|(&pos, kind)| to_value(row.get(pos).unwrap_or(""), *kind))
                .collect();
            let record = Record::new(values);
            match row.position() {
                Some(pos) => record.at_line(pos.line()),
                None => record,
            }
        })
        .collect::<Vec<_>>();

    info!(
        records = records.len(),
        path = %resolved.display(),
        "Loaded records"
    );

    Ok(RecordSet::new(columns, records))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Str,
    Timestamp,
}

/// A column is integer-typed when every non-empty cell parses as `i64`.
fn infer_kind(rows: &[StringRecord], pos: usize) -> ColumnKind {
    let mut seen_value = false;
    for cell in rows.iter().filter_map(|r| r.get(pos)) {
        if cell.is_empty() {
            continue;
        }
        if cell.parse::<i64>().is_err() {
            return ColumnKind::Str;
        }
        seen_value = true;
    }
    if seen_value {
        ColumnKind::Int
    } else {
        ColumnKind::Str
    }
}

fn to_value(cell: &str, kind: ColumnKind) -> Value {
    if cell.is_empty() {
        return Value::Empty;
    }
    match kind {
        ColumnKind::Int => cell.parse().map(Value::Int).unwrap_or(Value::Empty),
        ColumnKind::Str => Value::Str(cell.to_string()),
        ColumnKind::Timestamp => parse_timestamp(cell)
            .map(Value::Timestamp)
            .unwrap_or(Value::Empty),
    }
}

/// Parses the timestamp shapes found in LDBC exports. Offsets are dropped, keeping the
/// wall-clock time as written.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    // epoch milliseconds
    s.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.naive_utc())
}

fn require_column(columns: &[String], name: &str, path: &Path) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| ImportError::malformed(path, None, format!("missing column '{name}'")))
}

fn csv_error(path: &Path, e: csv::Error) -> ImportError {
    let line = e.position().map(|p| p.line());
    ImportError::malformed(path, line, e.to_string())
}
