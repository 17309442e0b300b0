//! Raw table loading.
//!
//! Spreadsheets are read with calamine: first sheet, first row as header.
//! CSV uploads are read with polars as strings and then have numeric-looking
//! columns promoted to Float64. Headers are kept as written; normalization
//! happens in [`crate::normalize`].

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use polars::prelude::*;
use tracing::debug;

use crate::error::{QcError, QcResult};

const DATETIME_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// xlsx, xlsm, xlsb, xls or ods
    Spreadsheet,
    Csv,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") | Some("txt") => InputFormat::Csv,
            _ => InputFormat::Spreadsheet,
        }
    }
}

/// Read uploaded bytes into a raw table.
pub fn load_bytes(bytes: &[u8], format: InputFormat) -> QcResult<DataFrame> {
    match format {
        InputFormat::Spreadsheet => read_spreadsheet(bytes),
        InputFormat::Csv => read_csv(bytes),
    }
}

/// Read a file from disk, choosing the format from its extension.
pub fn load_path<P: AsRef<Path>>(path: P) -> QcResult<DataFrame> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    load_bytes(&bytes, InputFormat::from_path(path))
}

/// Read the first sheet of a workbook.
pub fn read_spreadsheet(bytes: &[u8]) -> QcResult<DataFrame> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| QcError::Parse("workbook contains no sheets".into()))??;
    range_to_frame(&range)
}

/// Convert a sheet range into a DataFrame using its first row as header.
pub fn range_to_frame(range: &Range<Data>) -> QcResult<DataFrame> {
    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| QcError::Parse("sheet is empty; expected a header row".into()))?;

    let headers = dedup_headers(
        header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| header_text(cell, i))
            .collect(),
    );

    let width = headers.len();
    let mut cells: Vec<Vec<&Data>> = vec![Vec::new(); width];
    for row in rows {
        for (i, column) in cells.iter_mut().enumerate() {
            column.push(row.get(i).unwrap_or(&Data::Empty));
        }
    }

    let columns: Vec<Column> = headers
        .iter()
        .zip(cells.iter())
        .map(|(name, values)| build_column(name, values))
        .collect();

    let df = DataFrame::new(columns)?;
    debug!(
        rows = df.height(),
        columns = df.width(),
        "loaded spreadsheet sheet"
    );
    Ok(df)
}

/// Read a CSV upload with every column as String, then promote numeric ones.
pub fn read_csv(bytes: &[u8]) -> QcResult<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .map_err(|e| QcError::Parse(e.to_string()))?;

    let columns = df
        .get_columns()
        .iter()
        .map(promote_numeric)
        .collect::<QcResult<Vec<_>>>()?;
    let df = DataFrame::new(columns)?;
    debug!(rows = df.height(), columns = df.width(), "loaded csv");
    Ok(df)
}

// ── Private helpers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Empty,
    Integer,
    Float,
    Bool,
    Text,
}

fn header_text(cell: &Data, index: usize) -> String {
    match cell {
        Data::Empty => format!("unnamed_{index}"),
        other => {
            let text = cell_text(other).unwrap_or_default();
            if text.trim().is_empty() {
                format!("unnamed_{index}")
            } else {
                text
            }
        }
    }
}

/// Exact duplicate headers get a `.1`, `.2`, ... suffix so the raw frame can
/// be built; near-duplicates are left to the normalizer.
fn dedup_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|h| {
            let count = seen.entry(h.clone()).or_insert(0);
            let name = if *count == 0 {
                h.clone()
            } else {
                format!("{h}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

fn classify(cell: &Data) -> CellKind {
    match cell {
        Data::Empty | Data::Error(_) => CellKind::Empty,
        Data::Int(_) => CellKind::Integer,
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => CellKind::Integer,
        Data::Float(_) => CellKind::Float,
        Data::Bool(_) => CellKind::Bool,
        Data::String(s) if s.trim().is_empty() => CellKind::Empty,
        _ => CellKind::Text,
    }
}

fn column_kind(values: &[&Data]) -> CellKind {
    values
        .iter()
        .map(|c| classify(c))
        .fold(CellKind::Empty, |acc, kind| match (acc, kind) {
            (a, CellKind::Empty) => a,
            (CellKind::Empty, k) => k,
            (a, k) if a == k => a,
            (CellKind::Integer, CellKind::Float) | (CellKind::Float, CellKind::Integer) => {
                CellKind::Float
            }
            _ => CellKind::Text,
        })
}

fn build_column(name: &str, values: &[&Data]) -> Column {
    match column_kind(values) {
        CellKind::Integer => {
            let v: Vec<Option<i64>> = values
                .iter()
                .map(|c| match c {
                    Data::Int(i) => Some(*i),
                    Data::Float(f) => Some(*f as i64),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), v)
        }
        CellKind::Float => {
            let v: Vec<Option<f64>> = values
                .iter()
                .map(|c| match c {
                    Data::Int(i) => Some(*i as f64),
                    Data::Float(f) => Some(*f),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), v)
        }
        CellKind::Bool => {
            let v: Vec<Option<bool>> = values
                .iter()
                .map(|c| match c {
                    Data::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), v)
        }
        CellKind::Text | CellKind::Empty => {
            let v: Vec<Option<String>> = values.iter().map(|c| cell_text(c)).collect();
            Column::new(name.into(), v)
        }
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(s.clone())
            }
        }
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_number(*f)),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format(DATETIME_TEXT_FORMAT).to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Replace a String column by Float64 when every non-blank value parses.
fn promote_numeric(column: &Column) -> QcResult<Column> {
    let series = column.as_materialized_series();
    let Ok(ca) = series.str() else {
        return Ok(column.clone());
    };

    let mut non_blank = 0usize;
    let mut parsed: Vec<Option<f64>> = Vec::with_capacity(ca.len());
    for value in ca.into_iter() {
        let trimmed = value.map(str::trim).filter(|t| !t.is_empty());
        if trimmed.is_some() {
            non_blank += 1;
        }
        parsed.push(trimmed.and_then(|t| t.parse::<f64>().ok()));
    }
    let parsed_count = parsed.iter().filter(|v| v.is_some()).count();

    if non_blank > 0 && parsed_count == non_blank {
        Ok(Column::new(column.name().clone(), parsed))
    } else {
        Ok(column.clone())
    }
}
