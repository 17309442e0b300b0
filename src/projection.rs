//! UTM to geographic (WGS84) conversion.

use serde::{Deserialize, Serialize};
use tracing::debug;

use polars::prelude::*;

use crate::capabilities::Capabilities;
use crate::config::ProjectionConfig;
use crate::error::{QcError, QcResult};
use crate::notice::{Metric, Notice};
use crate::schema::{geometry, projection};

const K0: f64 = 0.9996;
const E: f64 = 0.00669438;
const R: f64 = 6_378_137.0;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    /// Hemisphere for a zone letter.
    ///
    /// `N` and `S` are read as hemisphere designators. Other letters are MGRS
    /// latitude bands: `C`..`M` south, `P`..`X` north.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'N' => Some(Hemisphere::North),
            'S' => Some(Hemisphere::South),
            'I' | 'O' => None,
            c @ 'C'..='X' if c > 'N' => Some(Hemisphere::North),
            'C'..='X' => Some(Hemisphere::South),
            _ => None,
        }
    }
}

/// Inverse transverse Mercator. Returns `(latitude, longitude)` in degrees.
///
/// Fails with [`QcError::InvalidData`] for an easting outside
/// `[100_000, 1_000_000)`, a northing outside `[0, 10_000_000]` or a zone
/// outside `1..=60`.
pub fn utm_to_latlon(
    easting: f64,
    northing: f64,
    zone: u8,
    hemisphere: Hemisphere,
) -> QcResult<(f64, f64)> {
    if !(100_000.0..1_000_000.0).contains(&easting) {
        return Err(QcError::InvalidData(format!(
            "easting {easting} out of range [100000, 1000000)"
        )));
    }
    if !(0.0..=10_000_000.0).contains(&northing) {
        return Err(QcError::InvalidData(format!(
            "northing {northing} out of range [0, 10000000]"
        )));
    }
    if !(1..=60).contains(&zone) {
        return Err(QcError::InvalidData(format!(
            "zone {zone} out of range 1..=60"
        )));
    }

    let m_e = 1.0 - E;
    let e_p2 = E / m_e;
    let sqrt_m_e = m_e.sqrt();
    let e1 = (1.0 - sqrt_m_e) / (1.0 + sqrt_m_e);
    let (e2, e3) = (E * E, E * E * E);

    let x = easting - FALSE_EASTING;
    let y = match hemisphere {
        Hemisphere::North => northing,
        Hemisphere::South => northing - FALSE_NORTHING_SOUTH,
    };

    let m = y / K0;
    let mu = m / (R * (1.0 - E / 4.0 - 3.0 * e2 / 64.0 - 5.0 * e3 / 256.0));

    let p_rad = mu
        + (3.0 / 2.0 * e1 - 27.0 / 32.0 * e1.powi(3)) * (2.0 * mu).sin()
        + (21.0 / 16.0 * e1.powi(2) - 55.0 / 32.0 * e1.powi(4)) * (4.0 * mu).sin()
        + (151.0 / 96.0 * e1.powi(3)) * (6.0 * mu).sin()
        + (1097.0 / 512.0 * e1.powi(4)) * (8.0 * mu).sin();

    let (p_sin, p_cos) = p_rad.sin_cos();
    let p_tan = p_sin / p_cos;
    let p_tan2 = p_tan * p_tan;
    let p_tan4 = p_tan2 * p_tan2;

    let ep_sin = 1.0 - E * p_sin * p_sin;
    let ep_sin_sqrt = ep_sin.sqrt();

    let n = R / ep_sin_sqrt;
    let r = m_e / ep_sin;
    let c = e_p2 * p_cos * p_cos;
    let c2 = c * c;

    let d = x / (n * K0);
    let (d2, d3, d4, d5, d6) = (d.powi(2), d.powi(3), d.powi(4), d.powi(5), d.powi(6));

    let latitude = p_rad
        - (p_tan / r)
            * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * e_p2)
                + d6 / 720.0
                    * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4
                        - 252.0 * e_p2
                        - 3.0 * c2));

    let longitude = (d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
        + d5 / 120.0 * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * e_p2 + 24.0 * p_tan4))
        / p_cos;

    let central = central_meridian(zone);
    Ok((latitude.to_degrees(), longitude.to_degrees() + central))
}

fn central_meridian(zone: u8) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Add `latitud` and `longitud` computed from `x` and `y`.
///
/// Rows carry their own zone through `zona` and `letra_zona` when both
/// columns exist; a null in either falls back to the configured default.
/// Rows that cannot be projected get null coordinates and are counted in an
/// [`Notice::InvalidValueSkip`].
pub fn add_geographic_coordinates(
    df: DataFrame,
    config: &ProjectionConfig,
    caps: &Capabilities,
    notices: &mut Vec<Notice>,
) -> QcResult<DataFrame> {
    for name in [geometry::X, geometry::Y] {
        if !df.schema().contains(name) {
            return Err(QcError::MissingColumn(format!(
                "projection requires column '{name}'"
            )));
        }
    }

    let xs = df.column(geometry::X)?.cast(&DataType::Float64)?;
    let ys = df.column(geometry::Y)?.cast(&DataType::Float64)?;
    let (xs, ys) = (xs.f64()?, ys.f64()?);

    let (zones, letters) = if caps.utm_zone {
        let zones = df
            .column(projection::ZONE_NUMBER)?
            .cast(&DataType::Int64)?;
        let letters = df
            .column(projection::ZONE_LETTER)?
            .cast(&DataType::String)?;
        (Some(zones), Some(letters))
    } else {
        (None, None)
    };
    let zones = zones.as_ref().map(|c| c.i64()).transpose()?;
    let letters = letters.as_ref().map(|c| c.str()).transpose()?;

    let mut lat = Vec::with_capacity(df.height());
    let mut lon = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for i in 0..df.height() {
        let zone = match zones.and_then(|z| z.get(i)) {
            Some(z) => u8::try_from(z).ok(),
            None => Some(config.default_zone),
        };
        let hemisphere = match letters.and_then(|l| l.get(i)) {
            Some(letter) => letter.trim().chars().next().and_then(Hemisphere::from_letter),
            None => Some(config.default_hemisphere),
        };

        let point = match (xs.get(i), ys.get(i), zone, hemisphere) {
            (Some(e), Some(n), Some(z), Some(h)) => utm_to_latlon(e, n, z, h).ok(),
            _ => None,
        };
        if point.is_none() {
            skipped += 1;
        }
        lat.push(point.map(|p| p.0));
        lon.push(point.map(|p| p.1));
    }

    if skipped > 0 {
        notices.push(Notice::InvalidValueSkip {
            metric: Metric::Projection,
            rows: skipped,
        });
    }
    debug!(rows = df.height(), skipped, "projected UTM coordinates");

    let mut df = df;
    df.with_column(Column::new(projection::LATITUD.into(), lat))?;
    df.with_column(Column::new(projection::LONGITUD.into(), lon))?;
    Ok(df)
}
