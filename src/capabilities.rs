//! Which optional analyses a canonical table supports.
//!
//! Computed once after cleaning so downstream code branches on a record
//! instead of probing the schema repeatedly.

use polars::prelude::DataFrame;
use serde::Serialize;

use crate::schema::{hole, projection, zone};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// `kilos_cargados_real` and `longitud_real` both present.
    pub load_factor: bool,
    /// `longitud_real` and `longitud_teo` both present and the real length
    /// was not copied from the planned one.
    pub length_deviation: bool,
    /// `longitud_real` was filled from `longitud_teo`.
    pub length_from_plan: bool,
    pub diameter: bool,
    /// First zone key found among `holes_polygon`, `banco`, `zona`.
    pub zone_key: Option<&'static str>,
    /// Zone key present and explosive mass available to aggregate.
    pub zone_summary: bool,
    pub blast_date: bool,
    pub hole_id: bool,
    /// Per-row UTM zone number and letter.
    pub utm_zone: bool,
}

impl Capabilities {
    pub fn detect(df: &DataFrame, length_from_plan: bool) -> Self {
        let schema = df.schema();
        let has = |name: &str| schema.contains(name);
        let zone_key = zone::PRIORITY.iter().copied().find(|k| has(k));
        let load_mass = has(hole::KILOS_CARGADOS_REAL);

        Self {
            load_factor: load_mass && has(hole::LONGITUD_REAL),
            length_deviation: !length_from_plan
                && has(hole::LONGITUD_REAL)
                && has(hole::LONGITUD_TEO),
            length_from_plan,
            diameter: has(hole::DIAMETRO),
            zone_key,
            zone_summary: zone_key.is_some() && load_mass,
            blast_date: has(hole::FECHA_TRONADURA),
            hole_id: has(hole::NUMERO),
            utm_zone: has(projection::ZONE_NUMBER) && has(projection::ZONE_LETTER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame_with(names: &[&str]) -> DataFrame {
        let columns: Vec<Column> = names
            .iter()
            .map(|n| Column::new((*n).into(), [1.0f64]))
            .collect();
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn zone_key_priority() {
        let caps = Capabilities::detect(&frame_with(&["zona", "banco"]), false);
        assert_eq!(caps.zone_key, Some("banco"));
        let caps = Capabilities::detect(&frame_with(&["zona", "holes_polygon", "banco"]), false);
        assert_eq!(caps.zone_key, Some("holes_polygon"));
    }

    #[test]
    fn load_factor_needs_both_inputs() {
        let caps = Capabilities::detect(&frame_with(&["kilos_cargados_real"]), false);
        assert!(!caps.load_factor);
        let caps =
            Capabilities::detect(&frame_with(&["kilos_cargados_real", "longitud_real"]), false);
        assert!(caps.load_factor);
    }

    #[test]
    fn fallback_length_disables_deviation() {
        let caps = Capabilities::detect(&frame_with(&["longitud_real", "longitud_teo"]), true);
        assert!(!caps.length_deviation);
        assert!(caps.length_from_plan);
    }
}
