//! Serializable quality summary of a table or filtered view.

use serde::Serialize;

use polars::prelude::DataFrame;

use crate::capabilities::Capabilities;
use crate::config::QualityConfig;
use crate::error::QcResult;
use crate::metrics::{
    self, DeviationSummary, DiameterSummary, LoadFactorSummary, SummaryStats, ZoneRow,
};
use crate::notice::{Metric, Notice};
use crate::schema::{hole, zone};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub holes: usize,
    pub capabilities: Capabilities,
    pub total_kg: Option<f64>,
    pub real_length: Option<SummaryStats>,
    pub load_factor: Option<LoadFactorSummary>,
    pub length_deviation: Option<DeviationSummary>,
    pub diameter: Option<DiameterSummary>,
    pub zone_key: Option<&'static str>,
    pub zones: Vec<ZoneRow>,
    pub notices: Vec<Notice>,
}

impl QualityReport {
    /// Summarize `view`. Notices from processing are carried over and any
    /// metric that cannot be computed on this view adds its own.
    pub fn compute(
        view: &DataFrame,
        caps: &Capabilities,
        config: &QualityConfig,
        notices: &[Notice],
    ) -> QcResult<Self> {
        let mut notices = notices.to_vec();

        let load_factor = if caps.load_factor {
            metrics::load_factor_summary(view)?
        } else {
            None
        };
        let length_deviation = if caps.length_deviation {
            metrics::length_deviation_summary(view)?
        } else {
            None
        };
        let diameter = if caps.diameter {
            metrics::diameter_summary(view, config.diameter_tolerance_mm)?
        } else {
            None
        };

        let zones = match metrics::zone_summary(view, caps)? {
            Some(summary) => caps
                .zone_key
                .map(|key| metrics::zone_rows(&summary, key))
                .transpose()?
                .unwrap_or_default(),
            None => {
                let columns = match caps.zone_key {
                    Some(_) => vec![hole::KILOS_CARGADOS_REAL],
                    None => zone::PRIORITY.to_vec(),
                };
                notices.push(Notice::MissingColumn {
                    metric: Metric::ZoneSummary,
                    columns,
                });
                Vec::new()
            }
        };

        let masses = metrics::finite_values(view, hole::KILOS_CARGADOS_REAL)?;
        let total_kg = (!masses.is_empty()).then(|| masses.iter().sum());

        Ok(Self {
            holes: view.height(),
            capabilities: caps.clone(),
            total_kg,
            real_length: metrics::column_stats(view, hole::LONGITUD_REAL)?,
            load_factor,
            length_deviation,
            diameter,
            zone_key: caps.zone_key,
            zones,
            notices,
        })
    }

    pub fn to_json(&self) -> QcResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
