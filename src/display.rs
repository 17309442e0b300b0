//! Presentation-ready columns: diameter in inches, formatted blast date and
//! the hover field list for spatial plots.

use polars::prelude::*;

use crate::error::QcResult;
use crate::schema::{derived, geometry, hole, zone};

const MM_PER_INCH: f64 = 25.4;
const MAX_DENOMINATOR: i64 = 16;

/// Render inches as a mixed fraction: `6.5 → "6 1/2"`, `0.25 → "1/4"`.
///
/// The fractional part is approximated by the nearest fraction with a
/// denominator of at most 16 and reduced. A fraction that rounds to a whole
/// carries into the integer part. Negative values keep only their integer
/// part. Null and non-finite inputs render as an empty string.
pub fn inches_to_mixed(inches: f64) -> String {
    if !inches.is_finite() {
        return String::new();
    }
    if inches < 0.0 {
        return format!("{}", inches.trunc() as i64);
    }

    // beyond i64 the fraction is lost anyway
    if inches >= i64::MAX as f64 {
        return format!("{}", i64::MAX);
    }

    let mut whole = inches.trunc() as i64;
    let (mut num, den) = nearest_fraction(inches - whole as f64);
    if num == den {
        whole = whole.saturating_add(1);
        num = 0;
    }

    match (whole, num) {
        (w, 0) => w.to_string(),
        (0, n) => format!("{n}/{den}"),
        (w, n) => format!("{w} {n}/{den}"),
    }
}

/// Best `n/d` for `frac` in `[0, 1)` with `d <= 16`, reduced.
///
/// The smallest denominator wins when two fractions are equally close.
fn nearest_fraction(frac: f64) -> (i64, i64) {
    let mut best = (0i64, 1i64);
    let mut best_err = frac.abs();
    for den in 2..=MAX_DENOMINATOR {
        let num = (frac * den as f64).round() as i64;
        let err = (frac - num as f64 / den as f64).abs();
        if err < best_err {
            best = (num, den);
            best_err = err;
        }
    }
    let g = gcd(best.0, best.1);
    (best.0 / g, best.1 / g)
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs().max(1)
    } else {
        gcd(b, a % b)
    }
}

/// Add `diametro_pulgadas`, `diametro_pulgadas_str` and
/// `fecha_tronadura_str` where their sources exist.
pub fn with_display_columns(mut df: DataFrame) -> QcResult<DataFrame> {
    let schema = df.schema().clone();

    if schema.contains(hole::DIAMETRO) {
        let inches: Float64Chunked = df
            .column(hole::DIAMETRO)?
            .cast(&DataType::Float64)?
            .f64()?
            .apply_values(|mm| mm / MM_PER_INCH);
        let labels: StringChunked = (&inches)
            .into_iter()
            .map(|v| v.map(inches_to_mixed).unwrap_or_default())
            .collect();

        df.with_column(
            inches
                .with_name(derived::DIAMETRO_PULGADAS.into())
                .into_column(),
        )?;
        df.with_column(
            labels
                .with_name(derived::DIAMETRO_PULGADAS_STR.into())
                .into_column(),
        )?;
    }

    if schema.get(hole::FECHA_TRONADURA) == Some(&DataType::Date) {
        df = df
            .lazy()
            .with_column(
                col(hole::FECHA_TRONADURA)
                    .dt()
                    .strftime("%d-%m-%Y")
                    .alias(derived::FECHA_TRONADURA_STR),
            )
            .collect()?;
    }

    Ok(df)
}

/// Hover fields in display order: `(column, label)`.
pub const HOVER_FIELDS: [(&str, &str); 8] = [
    (hole::NUMERO, "Pozo"),
    (geometry::COTA, "Banco"),
    (hole::KILOS_CARGADOS_REAL, "Kg"),
    (hole::LONGITUD_REAL, "L (m)"),
    (derived::FACTOR_CARGA, "FC"),
    (derived::FECHA_TRONADURA_STR, "Fecha"),
    (zone::HOLES_POLYGON, "Malla"),
    (derived::DIAMETRO_PULGADAS_STR, "Ø (pulg)"),
];

/// [`HOVER_FIELDS`] restricted to the columns `df` actually has.
pub fn hover_fields(df: &DataFrame) -> Vec<(&'static str, &'static str)> {
    let schema = df.schema();
    HOVER_FIELDS
        .iter()
        .copied()
        .filter(|(name, _)| schema.contains(name))
        .collect()
}
