//! Derived quality metrics: load factor, length deviation, diameter
//! tolerance and per-zone aggregates.
//!
//! Column derivations are lazy polars expressions over the canonical table.
//! Every division guards against a zero or null denominator and turns
//! non-finite results into null, so null is the single "invalid" marker that
//! statistics skip.

use serde::Serialize;
use tracing::debug;

use polars::prelude::*;

use crate::capabilities::Capabilities;
use crate::error::QcResult;
use crate::notice::{Metric, Notice};
use crate::schema::{classification, derived, hole, zone_summary};

/// Descriptive statistics over the finite values of a column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl SummaryStats {
    /// Non-finite values are ignored. `None` when nothing is left.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = (count > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count,
            mean,
            std,
            min,
            max,
        })
    }
}

/// Finite values of a column cast to Float64; empty when the column is absent.
pub fn finite_values(df: &DataFrame, name: &str) -> QcResult<Vec<f64>> {
    if !df.schema().contains(name) {
        return Ok(Vec::new());
    }
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect())
}

pub fn column_stats(df: &DataFrame, name: &str) -> QcResult<Option<SummaryStats>> {
    Ok(SummaryStats::from_values(finite_values(df, name)?))
}

fn null_f64() -> Expr {
    lit(NULL).cast(DataType::Float64)
}

fn as_f64(name: &str) -> Expr {
    col(name).cast(DataType::Float64)
}

/// Keep finite values, null otherwise.
fn finite_or_null(e: Expr) -> Expr {
    when(e.clone().is_finite()).then(e).otherwise(null_f64())
}

// ── Load factor ─────────────────────────────────────────────────────────────

/// `kilos_cargados_real / longitud_real`, null for a zero, null or
/// non-finite result.
pub fn load_factor_expr() -> Expr {
    let length = as_f64(hole::LONGITUD_REAL);
    let ratio = as_f64(hole::KILOS_CARGADOS_REAL) / length.clone();
    when(length.neq(lit(0.0)))
        .then(finite_or_null(ratio))
        .otherwise(null_f64())
        .alias(derived::FACTOR_CARGA)
}

/// Add `factor_carga`. Without both inputs the column is all null.
pub fn with_load_factor(
    df: DataFrame,
    caps: &Capabilities,
    notices: &mut Vec<Notice>,
) -> QcResult<DataFrame> {
    if !caps.load_factor {
        let missing = missing_of(&df, &[hole::KILOS_CARGADOS_REAL, hole::LONGITUD_REAL]);
        notices.push(Notice::MissingColumn {
            metric: Metric::LoadFactor,
            columns: missing,
        });
        return Ok(df
            .lazy()
            .with_column(null_f64().alias(derived::FACTOR_CARGA))
            .collect()?);
    }

    let df = df.lazy().with_column(load_factor_expr()).collect()?;
    let invalid = df.column(derived::FACTOR_CARGA)?.null_count();
    if invalid > 0 {
        notices.push(Notice::InvalidValueSkip {
            metric: Metric::LoadFactor,
            rows: invalid,
        });
    }
    debug!(rows = df.height(), invalid, "computed load factor");
    Ok(df)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadFactorSummary {
    /// `None` when no row has a valid load factor.
    pub stats: Option<SummaryStats>,
    /// Rows left out because their load factor is null.
    pub excluded: usize,
    /// Every valid row has the same load factor.
    pub uniform: bool,
}

pub fn load_factor_summary(df: &DataFrame) -> QcResult<Option<LoadFactorSummary>> {
    if !df.schema().contains(derived::FACTOR_CARGA) {
        return Ok(None);
    }
    let values = finite_values(df, derived::FACTOR_CARGA)?;
    let excluded = df.height() - values.len();
    let uniform = values.windows(2).all(|w| w[0] == w[1]);
    Ok(Some(LoadFactorSummary {
        stats: SummaryStats::from_values(values),
        excluded,
        uniform,
    }))
}

// ── Length deviation ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthClass {
    UnderDrilled,
    WithinTolerance,
    OverDrilled,
}

impl LengthClass {
    pub fn label(self) -> &'static str {
        match self {
            LengthClass::UnderDrilled => classification::UNDER_DRILLED,
            LengthClass::WithinTolerance => classification::WITHIN_TOLERANCE,
            LengthClass::OverDrilled => classification::OVER_DRILLED,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            classification::UNDER_DRILLED => Some(LengthClass::UnderDrilled),
            classification::WITHIN_TOLERANCE => Some(LengthClass::WithinTolerance),
            classification::OVER_DRILLED => Some(LengthClass::OverDrilled),
            _ => None,
        }
    }
}

/// Percent deviation of the drilled length from plan; null for a zero plan.
pub fn deviation_expr() -> Expr {
    let planned = as_f64(hole::LONGITUD_TEO);
    let pct = lit(100.0) * (as_f64(hole::LONGITUD_REAL) - planned.clone()) / planned.clone();
    when(planned.neq(lit(0.0)))
        .then(finite_or_null(pct))
        .otherwise(null_f64())
        .alias(derived::DESVIACION_PCT)
}

/// Label each deviation. Boundaries are inclusive: `±band` itself is within
/// tolerance.
pub fn classification_expr(band_pct: f64) -> Expr {
    let dev = col(derived::DESVIACION_PCT);
    when(dev.clone().lt(lit(-band_pct)))
        .then(lit(LengthClass::UnderDrilled.label()))
        .when(dev.clone().gt(lit(band_pct)))
        .then(lit(LengthClass::OverDrilled.label()))
        .when(dev.is_not_null())
        .then(lit(LengthClass::WithinTolerance.label()))
        .otherwise(lit(NULL).cast(DataType::String))
        .alias(derived::CLASIFICACION)
}

/// Add `desviacion_%` and `clasificacion` when both lengths are available.
pub fn with_length_deviation(
    df: DataFrame,
    caps: &Capabilities,
    band_pct: f64,
    notices: &mut Vec<Notice>,
) -> QcResult<DataFrame> {
    if !caps.length_deviation {
        // the fallback case already carries its own notice
        if !caps.length_from_plan {
            notices.push(Notice::MissingColumn {
                metric: Metric::LengthDeviation,
                columns: missing_of(&df, &[hole::LONGITUD_REAL, hole::LONGITUD_TEO]),
            });
        }
        return Ok(df);
    }

    let df = df
        .lazy()
        .with_column(deviation_expr())
        .with_column(classification_expr(band_pct))
        .collect()?;

    let unclassified = df.column(derived::CLASIFICACION)?.null_count();
    if unclassified > 0 {
        notices.push(Notice::InvalidValueSkip {
            metric: Metric::LengthDeviation,
            rows: unclassified,
        });
    }
    Ok(df)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationSummary {
    pub classified: usize,
    pub under_drilled: usize,
    pub within_tolerance: usize,
    pub over_drilled: usize,
    pub pct_under: f64,
    pub pct_over: f64,
    pub real_length: Option<SummaryStats>,
}

pub fn length_deviation_summary(df: &DataFrame) -> QcResult<Option<DeviationSummary>> {
    if !df.schema().contains(derived::CLASIFICACION) {
        return Ok(None);
    }
    let classes = df.column(derived::CLASIFICACION)?.str()?.clone();
    let (mut under, mut within, mut over) = (0usize, 0usize, 0usize);
    for class in classes.into_iter().flatten() {
        match LengthClass::from_label(class) {
            Some(LengthClass::UnderDrilled) => under += 1,
            Some(LengthClass::OverDrilled) => over += 1,
            Some(LengthClass::WithinTolerance) => within += 1,
            None => {}
        }
    }
    let classified = under + within + over;
    if classified == 0 {
        return Ok(None);
    }

    let classified_rows = df
        .clone()
        .lazy()
        .filter(col(derived::CLASIFICACION).is_not_null())
        .collect()?;

    Ok(Some(DeviationSummary {
        classified,
        under_drilled: under,
        within_tolerance: within,
        over_drilled: over,
        pct_under: 100.0 * under as f64 / classified as f64,
        pct_over: 100.0 * over as f64 / classified as f64,
        real_length: column_stats(&classified_rows, hole::LONGITUD_REAL)?,
    }))
}

// ── Diameter tolerance ──────────────────────────────────────────────────────

/// Statistical mode; the smallest value wins a tie. Falls back to the mean
/// when no mode exists.
pub fn nominal_diameter(values: &[f64]) -> Option<f64> {
    mode(values).or_else(|| SummaryStats::from_values(values.iter().copied()).map(|s| s.mean))
}

fn mode(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let value = sorted[i];
        let run = sorted[i..].iter().take_while(|v| **v == value).count();
        // strictly greater keeps the smaller value on ties
        if best.map_or(true, |(_, n)| run > n) {
            best = Some((value, run));
        }
        i += run;
    }
    best.map(|(value, _)| value)
}

/// Add `diametro_fuera_tol` against the nominal diameter of this frame.
///
/// Returns the frame and the nominal used. The flag is null where the
/// diameter is null or not finite.
pub fn flag_diameter_tolerance(
    df: DataFrame,
    tolerance_mm: f64,
) -> QcResult<(DataFrame, Option<f64>)> {
    if !df.schema().contains(hole::DIAMETRO) {
        return Ok((df, None));
    }
    let nominal = nominal_diameter(&finite_values(&df, hole::DIAMETRO)?);

    let flag = match nominal {
        Some(nominal) => {
            let diameter = finite_or_null(as_f64(hole::DIAMETRO));
            (diameter - lit(nominal)).abs().gt(lit(tolerance_mm))
        }
        None => lit(NULL).cast(DataType::Boolean),
    };
    let df = df
        .lazy()
        .with_column(flag.alias(derived::DIAMETRO_FUERA_TOL))
        .collect()?;
    debug!(?nominal, tolerance_mm, "flagged diameter tolerance");
    Ok((df, nominal))
}

pub fn with_diameter_tolerance(
    df: DataFrame,
    caps: &Capabilities,
    tolerance_mm: f64,
    notices: &mut Vec<Notice>,
) -> QcResult<DataFrame> {
    if !caps.diameter {
        notices.push(Notice::MissingColumn {
            metric: Metric::DiameterTolerance,
            columns: vec![hole::DIAMETRO],
        });
        return Ok(df);
    }
    let (df, _) = flag_diameter_tolerance(df, tolerance_mm)?;
    Ok(df)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiameterSummary {
    pub nominal_mm: f64,
    pub tolerance_mm: f64,
    pub stats: SummaryStats,
    pub out_of_tolerance: usize,
    pub pct_out: f64,
}

/// Recomputes the nominal on `df`, so a filtered view gets its own nominal.
pub fn diameter_summary(df: &DataFrame, tolerance_mm: f64) -> QcResult<Option<DiameterSummary>> {
    let values = finite_values(df, hole::DIAMETRO)?;
    let (Some(nominal), Some(stats)) = (
        nominal_diameter(&values),
        SummaryStats::from_values(values.iter().copied()),
    ) else {
        return Ok(None);
    };
    let out_of_tolerance = values
        .iter()
        .filter(|d| (*d - nominal).abs() > tolerance_mm)
        .count();
    Ok(Some(DiameterSummary {
        nominal_mm: nominal,
        tolerance_mm,
        stats,
        out_of_tolerance,
        pct_out: 100.0 * out_of_tolerance as f64 / values.len() as f64,
    }))
}

// ── Zone aggregation ────────────────────────────────────────────────────────

/// Per-zone totals grouped by the capability's zone key, sorted by key.
///
/// Columns: `<zone key>`, `total_kg`, `total_long`, `n_pozos`, `kg_por_m`.
/// `kg_por_m` is null where the zone's total length is zero or unknown.
pub fn zone_summary(df: &DataFrame, caps: &Capabilities) -> QcResult<Option<DataFrame>> {
    let Some(key) = caps.zone_key.filter(|_| caps.zone_summary) else {
        return Ok(None);
    };

    let mass = as_f64(hole::KILOS_CARGADOS_REAL);
    let has_length = df.schema().contains(hole::LONGITUD_REAL);

    let mut aggs = vec![
        mass.clone().sum().alias(zone_summary::TOTAL_KG),
        mass.count().alias(zone_summary::N_POZOS),
    ];
    if has_length {
        aggs.push(as_f64(hole::LONGITUD_REAL).sum().alias(zone_summary::TOTAL_LONG));
    }

    let mut lazy = df.clone().lazy().group_by([col(key)]).agg(aggs);
    if !has_length {
        lazy = lazy.with_column(null_f64().alias(zone_summary::TOTAL_LONG));
    }

    let total_long = col(zone_summary::TOTAL_LONG);
    let summary = lazy
        .with_column(
            when(total_long.clone().neq(lit(0.0)))
                .then(finite_or_null(col(zone_summary::TOTAL_KG) / total_long))
                .otherwise(null_f64())
                .alias(zone_summary::KG_POR_M),
        )
        .select([
            col(key),
            col(zone_summary::TOTAL_KG),
            col(zone_summary::TOTAL_LONG),
            col(zone_summary::N_POZOS),
            col(zone_summary::KG_POR_M),
        ])
        .sort([key], SortMultipleOptions::default().with_nulls_last(true))
        .collect()?;

    debug!(zone_key = key, zones = summary.height(), "built zone summary");
    Ok(Some(summary))
}

/// One zone of [`zone_summary`] in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneRow {
    pub zone: Option<String>,
    pub total_kg: f64,
    pub total_long: Option<f64>,
    pub holes: u32,
    pub kg_por_m: Option<f64>,
}

pub fn zone_rows(summary: &DataFrame, zone_key: &str) -> QcResult<Vec<ZoneRow>> {
    let zones = summary.column(zone_key)?.cast(&DataType::String)?;
    let zones = zones.str()?;
    let total_kg = summary.column(zone_summary::TOTAL_KG)?.f64()?;
    let total_long = summary.column(zone_summary::TOTAL_LONG)?.f64()?;
    let holes = summary
        .column(zone_summary::N_POZOS)?
        .cast(&DataType::UInt32)?;
    let holes = holes.u32()?;
    let kg_por_m = summary.column(zone_summary::KG_POR_M)?.f64()?;

    Ok((0..summary.height())
        .map(|i| ZoneRow {
            zone: zones.get(i).map(str::to_string),
            total_kg: total_kg.get(i).unwrap_or(0.0),
            total_long: total_long.get(i),
            holes: holes.get(i).unwrap_or(0),
            kg_por_m: kg_por_m.get(i),
        })
        .collect())
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn missing_of(df: &DataFrame, required: &[&'static str]) -> Vec<&'static str> {
    let schema = df.schema();
    required
        .iter()
        .copied()
        .filter(|c| !schema.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn caps_of(df: &DataFrame) -> Capabilities {
        Capabilities::detect(df, false)
    }

    #[test]
    fn stats_use_sample_std() {
        let s = SummaryStats::from_values([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.count, 8);
        assert_relative_eq!(s.mean, 5.0);
        assert_relative_eq!(s.std.unwrap(), 2.138089935299395, epsilon = 1e-12);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
    }

    #[test]
    fn stats_skip_non_finite() {
        let s = SummaryStats::from_values([1.0, f64::NAN, f64::INFINITY, 3.0]).unwrap();
        assert_eq!(s.count, 2);
        assert!(SummaryStats::from_values([f64::NAN]).is_none());
        assert!(SummaryStats::from_values([4.0]).unwrap().std.is_none());
    }

    #[test]
    fn load_factor_divides_and_nulls_invalid_rows() {
        let df = df!(
            "kilos_cargados_real" => [Some(50.0), Some(50.0), None, Some(30.0)],
            "longitud_real" => [Some(10.0), Some(0.0), Some(10.0), None],
        )
        .unwrap();
        let caps = caps_of(&df);
        let mut notices = Vec::new();
        let out = with_load_factor(df, &caps, &mut notices).unwrap();
        let fc = out.column("factor_carga").unwrap().f64().unwrap();
        assert_eq!(fc.get(0), Some(5.0));
        assert_eq!(fc.get(1), None);
        assert_eq!(fc.get(2), None);
        assert_eq!(fc.get(3), None);
        assert_eq!(
            notices,
            vec![Notice::InvalidValueSkip {
                metric: Metric::LoadFactor,
                rows: 3
            }]
        );

        let summary = load_factor_summary(&out).unwrap().unwrap();
        assert_eq!(summary.excluded, 3);
        assert_eq!(summary.stats.unwrap().count, 1);
        assert!(summary.uniform);
    }

    #[test]
    fn load_factor_without_inputs_is_all_null() {
        let df = df!("kilos_cargados_real" => [50.0, 60.0]).unwrap();
        let caps = caps_of(&df);
        let mut notices = Vec::new();
        let out = with_load_factor(df, &caps, &mut notices).unwrap();
        assert_eq!(out.column("factor_carga").unwrap().null_count(), 2);
        assert_eq!(
            notices,
            vec![Notice::MissingColumn {
                metric: Metric::LoadFactor,
                columns: vec!["longitud_real"],
            }]
        );
        let summary = load_factor_summary(&out).unwrap().unwrap();
        assert!(summary.stats.is_none());
    }

    #[test]
    fn deviation_columns() {
        let df = df!(
            "longitud_real" => [Some(105.0), Some(95.0), Some(110.0), Some(80.0), Some(10.0), None],
            "longitud_teo" => [Some(100.0), Some(100.0), Some(100.0), Some(100.0), Some(0.0), Some(10.0)],
        )
        .unwrap();
        let caps = caps_of(&df);
        let mut notices = Vec::new();
        let out = with_length_deviation(df, &caps, 5.0, &mut notices).unwrap();

        let dev = out.column("desviacion_%").unwrap().f64().unwrap();
        assert_relative_eq!(dev.get(0).unwrap(), 5.0);
        assert_relative_eq!(dev.get(2).unwrap(), 10.0);
        assert_eq!(dev.get(4), None);
        assert_eq!(dev.get(5), None);

        let class = out.column("clasificacion").unwrap().str().unwrap();
        assert_eq!(class.get(0), Some("within tolerance"));
        assert_eq!(class.get(1), Some("within tolerance"));
        assert_eq!(class.get(2), Some("over-drilled"));
        assert_eq!(class.get(3), Some("under-drilled"));
        assert_eq!(class.get(4), None);

        let summary = length_deviation_summary(&out).unwrap().unwrap();
        assert_eq!(summary.classified, 4);
        assert_eq!(summary.over_drilled, 1);
        assert_eq!(summary.under_drilled, 1);
        assert_relative_eq!(summary.pct_over, 25.0);
        assert_eq!(summary.real_length.unwrap().count, 4);
    }

    #[test]
    fn mode_prefers_smallest_on_ties() {
        assert_eq!(nominal_diameter(&[165.0, 171.0, 171.0, 165.0, 200.0]), Some(165.0));
        assert_eq!(nominal_diameter(&[171.0, 165.0, 171.0]), Some(171.0));
        assert_eq!(nominal_diameter(&[250.0, 229.0, 311.0]), Some(229.0));
        assert_eq!(nominal_diameter(&[]), None);
    }

    #[test]
    fn diameter_tolerance_boundary() {
        let df = df!("diametro" => [Some(100.0), Some(100.0), Some(103.0), Some(103.01), Some(96.5), None]).unwrap();
        let (out, nominal) = flag_diameter_tolerance(df, 3.0).unwrap();
        assert_eq!(nominal, Some(100.0));
        let flag = out.column("diametro_fuera_tol").unwrap().bool().unwrap();
        assert_eq!(flag.get(0), Some(false));
        assert_eq!(flag.get(2), Some(false));
        assert_eq!(flag.get(3), Some(true));
        assert_eq!(flag.get(4), Some(true));
        assert_eq!(flag.get(5), None);

        let summary = diameter_summary(&out, 3.0).unwrap().unwrap();
        assert_eq!(summary.out_of_tolerance, 2);
        assert_relative_eq!(summary.pct_out, 40.0);
    }

    #[test]
    fn zone_summary_groups_by_first_key() {
        let df = df!(
            "banco" => ["B2", "B1", "B1", "B2"],
            "zona" => ["Z1", "Z1", "Z2", "Z2"],
            "kilos_cargados_real" => [Some(10.0), Some(20.0), None, Some(30.0)],
            "longitud_real" => [0.0, 4.0, 6.0, 0.0],
        )
        .unwrap();
        let caps = caps_of(&df);
        let summary = zone_summary(&df, &caps).unwrap().unwrap();
        let rows = zone_rows(&summary, "banco").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].zone.as_deref(), Some("B1"));
        assert_relative_eq!(rows[0].total_kg, 20.0);
        assert_eq!(rows[0].total_long, Some(10.0));
        assert_eq!(rows[0].holes, 1);
        assert_eq!(rows[0].kg_por_m, Some(2.0));

        assert_eq!(rows[1].zone.as_deref(), Some("B2"));
        assert_relative_eq!(rows[1].total_kg, 40.0);
        assert_eq!(rows[1].kg_por_m, None);
    }

    #[test]
    fn zone_summary_without_length_column() {
        let df = df!(
            "zona" => ["Z1", "Z1"],
            "kilos_cargados_real" => [10.0, 5.0],
        )
        .unwrap();
        let caps = caps_of(&df);
        let summary = zone_summary(&df, &caps).unwrap().unwrap();
        let rows = zone_rows(&summary, "zona").unwrap();
        assert_eq!(rows[0].total_long, None);
        assert_eq!(rows[0].kg_por_m, None);
        assert_eq!(rows[0].holes, 2);
    }

    #[test]
    fn zone_summary_needs_mass() {
        let df = df!("zona" => ["Z1"]).unwrap();
        let caps = caps_of(&df);
        assert!(zone_summary(&df, &caps).unwrap().is_none());
    }
}
