//! Schema normalization: header canonicalization and synonym mapping.

use std::collections::HashMap;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::QcResult;
use crate::notice::Notice;
use crate::schema::{geometry, hole};

/// Normalized header → canonical column name.
///
/// Keys are already in normalized form, so lookups are case-insensitive with
/// respect to the raw header. No canonical name appears as a key, which keeps
/// normalization idempotent.
pub const SYNONYMS: &[(&str, &str)] = &[
    ("nombre_banco", geometry::COTA),
    ("latitud_geo", geometry::ESTE),
    ("longitud_geo", geometry::NORTE),
    ("nombre_real_profundidad", geometry::PROFUNDIDAD),
    ("easting", geometry::ESTE),
    ("northing", geometry::NORTE),
    ("elevation", geometry::COTA),
    ("depth", geometry::PROFUNDIDAD),
];

/// Result of normalizing a raw table.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub frame: DataFrame,
    /// Header collisions resolved by keeping the later column.
    pub notices: Vec<Notice>,
    /// `longitud_real` was created from `longitud_teo`.
    pub length_from_plan: bool,
}

/// `strip → lowercase → spaces and hyphens to underscores`.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Canonical name for a raw header: normalized, then mapped through
/// [`SYNONYMS`].
pub fn canonical_name(raw: &str) -> String {
    let normalized = normalize_header(raw);
    SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}

/// Rename every column to its canonical name.
///
/// When several columns land on the same name, the last one wins and the
/// earlier ones are dropped. Afterwards, if the table has `longitud_teo` but
/// no `longitud_real` column at all, `longitud_real` is added as a copy.
pub fn normalize(df: DataFrame) -> QcResult<Normalized> {
    let raw_names: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let targets: Vec<String> = raw_names.iter().map(|n| canonical_name(n)).collect();

    // index of the surviving column for each target name
    let mut winner: HashMap<&str, usize> = HashMap::new();
    for (i, target) in targets.iter().enumerate() {
        winner.insert(target.as_str(), i);
    }

    let mut notices = Vec::new();
    let mut columns: Vec<Column> = Vec::with_capacity(winner.len());
    for (i, column) in df.get_columns().iter().enumerate() {
        let target = targets[i].as_str();
        let kept = winner[target];
        if kept != i {
            warn!(
                column = target,
                kept = %raw_names[kept],
                dropped = %raw_names[i],
                "header collision, keeping the later column"
            );
            notices.push(Notice::HeaderCollision {
                column: target.to_string(),
                kept: raw_names[kept].clone(),
                dropped: raw_names[i].clone(),
            });
            continue;
        }
        let mut column = column.clone();
        column.rename(target.into());
        columns.push(column);
    }

    let mut frame = DataFrame::new(columns)?;

    let schema = frame.schema();
    let length_from_plan =
        !schema.contains(hole::LONGITUD_REAL) && schema.contains(hole::LONGITUD_TEO);
    if length_from_plan {
        let mut fallback = frame.column(hole::LONGITUD_TEO)?.clone();
        fallback.rename(hole::LONGITUD_REAL.into());
        frame.with_column(fallback)?;
        notices.push(Notice::LengthFromPlan);
    }

    debug!(
        columns = frame.width(),
        collisions = notices
            .iter()
            .filter(|n| matches!(n, Notice::HeaderCollision { .. }))
            .count(),
        length_from_plan,
        "normalized headers"
    );

    Ok(Normalized {
        frame,
        notices,
        length_from_plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rule() {
        assert_eq!(normalize_header("  Kilos Cargados Real "), "kilos_cargados_real");
        assert_eq!(normalize_header("Holes-Polygon"), "holes_polygon");
        assert_eq!(normalize_header("x"), "x");
    }

    #[test]
    fn synonyms_are_case_insensitive() {
        assert_eq!(canonical_name("Nombre Banco"), "cota");
        assert_eq!(canonical_name("LATITUD-GEO"), "este");
        assert_eq!(canonical_name("Longitud Geo"), "norte");
        assert_eq!(canonical_name("Nombre Real Profundidad"), "profundidad");
        assert_eq!(canonical_name("Diametro"), "diametro");
    }

    #[test]
    fn no_canonical_name_is_an_alias() {
        for (_, canonical) in SYNONYMS {
            assert!(SYNONYMS.iter().all(|(alias, _)| alias != canonical));
        }
    }

    #[test]
    fn collision_keeps_later_column() {
        let df = df!(
            "Este" => [1.0, 2.0],
            "Latitud Geo" => [10.0, 20.0],
        )
        .unwrap();
        let out = normalize(df).unwrap();
        assert_eq!(out.frame.get_column_names_str(), vec!["este"]);
        let este = out.frame.column("este").unwrap().f64().unwrap();
        assert_eq!(este.get(0), Some(10.0));
        assert_eq!(
            out.notices,
            vec![Notice::HeaderCollision {
                column: "este".into(),
                kept: "Latitud Geo".into(),
                dropped: "Este".into(),
            }]
        );
    }

    #[test]
    fn planned_length_fills_missing_real_length() {
        let df = df!("Longitud Teo" => [Some(12.0), None]).unwrap();
        let out = normalize(df).unwrap();
        assert!(out.length_from_plan);
        let real = out.frame.column("longitud_real").unwrap().f64().unwrap();
        assert_eq!(real.get(0), Some(12.0));
        assert_eq!(real.get(1), None);
        assert!(out.frame.column("longitud_teo").is_ok());
    }

    #[test]
    fn planned_length_ignored_when_real_column_exists_even_if_null() {
        let df = df!(
            "longitud_real" => [None::<f64>, None],
            "longitud_teo" => [Some(12.0), Some(13.0)],
        )
        .unwrap();
        let out = normalize(df).unwrap();
        assert!(!out.length_from_plan);
        assert_eq!(out.frame.column("longitud_real").unwrap().null_count(), 2);
    }
}
