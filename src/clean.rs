//! Record validation and cleaning.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info};

use crate::config::DateConfig;
use crate::error::QcResult;
use crate::notice::Notice;
use crate::schema::{geometry, hole};

/// Days between the Excel serial epoch (1899-12-30) and 1970-01-01.
const EXCEL_EPOCH_OFFSET_DAYS: i64 = 25_569;

#[derive(Debug, Clone)]
pub struct Cleaned {
    pub frame: DataFrame,
    pub notices: Vec<Notice>,
}

/// Drop rows with a null geometry value and coerce the blast date.
///
/// Expects `x`, `y`, `z` to exist (see [`crate::geometry::resolve_geometry`]).
/// Nothing else is removed: missing values in other columns stay null.
pub fn clean(df: DataFrame, dates: &DateConfig) -> QcResult<Cleaned> {
    let mut notices = Vec::new();
    let before = df.height();

    let df = drop_incomplete_geometry(df)?;
    let dropped = before - df.height();
    if dropped > 0 {
        info!(dropped, remaining = df.height(), "dropped rows without geometry");
        notices.push(Notice::DroppedRows { rows: dropped });
    }

    let (df, unparsed) = coerce_blast_date(df, dates)?;
    if unparsed > 0 {
        notices.push(Notice::UnparsedDates { rows: unparsed });
    }

    Ok(Cleaned { frame: df, notices })
}

/// Keep a row only if each of `x`, `y` and `z` is non-null (and not NaN for
/// float columns).
pub fn drop_incomplete_geometry(df: DataFrame) -> QcResult<DataFrame> {
    let schema = df.schema().clone();
    let predicate = geometry::REQUIRED
        .iter()
        .map(|name| {
            let present = col(*name).is_not_null();
            match schema.get(name) {
                Some(dt) if dt.is_float() => present.and(col(*name).is_not_nan()),
                _ => present,
            }
        })
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true));

    Ok(df.lazy().filter(predicate).collect()?)
}

/// Convert `fecha_tronadura` to `Date`. Returns the frame and the number of
/// non-null values that could not be parsed (now null).
pub fn coerce_blast_date(mut df: DataFrame, dates: &DateConfig) -> QcResult<(DataFrame, usize)> {
    if !df.schema().contains(hole::FECHA_TRONADURA) {
        return Ok((df, 0));
    }
    let column = df.column(hole::FECHA_TRONADURA)?;
    let source_nulls = column.null_count();
    let parsed = match date_column(column, &dates.formats)? {
        Some(parsed) => parsed,
        None => return Ok((df, 0)),
    };

    let unparsed = parsed.null_count().saturating_sub(source_nulls);
    df.with_column(parsed)?;
    debug!(unparsed, "coerced blast dates");
    Ok((df, unparsed))
}

/// `None` when the column already holds dates.
fn date_column(column: &Column, formats: &[String]) -> QcResult<Option<Column>> {
    let dtype = column.dtype();
    let days: Vec<Option<i32>> = if dtype == &DataType::Date {
        return Ok(None);
    } else if matches!(dtype, DataType::Datetime(_, _)) {
        return Ok(Some(column.cast(&DataType::Date)?));
    } else if dtype == &DataType::String {
        column
            .str()?
            .into_iter()
            .map(|v| v.and_then(|s| parse_date_text(s, formats)).map(epoch_days))
            .collect()
    } else if dtype.is_float() || dtype.is_integer() {
        column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.and_then(excel_serial_days))
            .collect()
    } else {
        vec![None; column.len()]
    };
    Ok(Some(
        Column::new(hole::FECHA_TRONADURA.into(), days).cast(&DataType::Date)?,
    ))
}

/// Try each format in order; datetime formats are truncated to their date.
pub fn parse_date_text(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(text, fmt)
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(text, fmt))
            .ok()
    })
}

fn epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() as i32
}

fn excel_serial_days(serial: f64) -> Option<i32> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    i32::try_from(serial.floor() as i64 - EXCEL_EPOCH_OFFSET_DAYS).ok()
}
