//! Writing tables and views to disk.

use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::error::QcResult;

/// Write `df` as CSV with a header row. Dates are written as `YYYY-MM-DD`.
pub fn write_csv<P: AsRef<Path>>(df: &DataFrame, path: P) -> QcResult<()> {
    let path = path.as_ref();
    let mut file = File::create(path)?;
    let mut df = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_date_format(Some("%Y-%m-%d".into()))
        .finish(&mut df)?;
    info!(path = %path.display(), rows = df.height(), "exported CSV");
    Ok(())
}

pub fn write_parquet<P: AsRef<Path>>(df: &DataFrame, path: P) -> QcResult<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut df = df.clone();
    ParquetWriter::new(file).finish(&mut df)?;
    info!(path = %path.display(), rows = df.height(), "exported Parquet");
    Ok(())
}

/// Read back a Parquet export.
pub fn read_parquet<P: AsRef<Path>>(path: P) -> QcResult<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}
