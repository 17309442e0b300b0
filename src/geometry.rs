//! Geometry resolution: guarantee the `x`, `y`, `z` columns exist.

use polars::prelude::*;
use tracing::debug;

use crate::error::{QcError, QcResult};
use crate::schema::geometry::{COTA, ESTE, NORTE, PROFUNDIDAD, X, Y, Z};

/// Target column and its candidate sources, in priority order.
pub const GEOMETRY_SOURCES: [(&str, &[&str]); 3] = [
    (X, &[ESTE]),
    (Y, &[NORTE]),
    (Z, &[COTA, PROFUNDIDAD]),
];

/// Copy the first available source into every missing geometry column.
///
/// Existing `x`/`y`/`z` columns are never overwritten. Fails with
/// [`QcError::MissingGeometry`] listing every axis that stays unresolved.
pub fn resolve_geometry(mut df: DataFrame) -> QcResult<DataFrame> {
    let mut unresolved = Vec::new();

    for (target, sources) in GEOMETRY_SOURCES {
        if df.schema().contains(target) {
            continue;
        }
        let source = sources.iter().find(|s| df.schema().contains(s));
        match source {
            Some(source) => {
                let mut column = df.column(source)?.clone();
                column.rename(target.into());
                df.with_column(column)?;
                debug!(column = target, source = *source, "resolved geometry column");
            }
            None => unresolved.push(target),
        }
    }

    if !unresolved.is_empty() {
        return Err(QcError::MissingGeometry {
            fields: unresolved,
            rows: df.height(),
        });
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_fill_missing_axes() {
        let df = df!(
            "este" => [1.0],
            "norte" => [2.0],
            "cota" => [3.0],
            "profundidad" => [4.0],
        )
        .unwrap();
        let out = resolve_geometry(df).unwrap();
        assert_eq!(out.column("x").unwrap().f64().unwrap().get(0), Some(1.0));
        assert_eq!(out.column("y").unwrap().f64().unwrap().get(0), Some(2.0));
        assert_eq!(out.column("z").unwrap().f64().unwrap().get(0), Some(3.0));
    }

    #[test]
    fn depth_is_used_when_no_bench_elevation() {
        let df = df!("este" => [1.0], "norte" => [2.0], "profundidad" => [15.0]).unwrap();
        let out = resolve_geometry(df).unwrap();
        assert_eq!(out.column("z").unwrap().f64().unwrap().get(0), Some(15.0));
    }

    #[test]
    fn existing_axis_is_kept() {
        let df = df!("x" => [9.0], "este" => [1.0], "y" => [2.0], "z" => [3.0]).unwrap();
        let out = resolve_geometry(df).unwrap();
        assert_eq!(out.column("x").unwrap().f64().unwrap().get(0), Some(9.0));
    }

    #[test]
    fn missing_axes_are_all_reported() {
        let df = df!("este" => [1.0, 2.0], "diametro" => [165.0, 165.0]).unwrap();
        match resolve_geometry(df) {
            Err(QcError::MissingGeometry { fields, rows }) => {
                assert_eq!(fields, vec!["y", "z"]);
                assert_eq!(rows, 2);
            }
            other => panic!("expected MissingGeometry, got {other:?}"),
        }
    }
}
