//! Non-fatal conditions raised while processing a dataset.
//!
//! None of these abort the pipeline. They travel next to the data so the
//! presentation layer can show an informational message in place of a chart
//! or metric whose inputs are missing.

use std::fmt;

use serde::Serialize;

/// Derived analysis a notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    LoadFactor,
    LengthDeviation,
    DiameterTolerance,
    ZoneSummary,
    Projection,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::LoadFactor => "load factor",
            Metric::LengthDeviation => "length deviation",
            Metric::DiameterTolerance => "diameter tolerance",
            Metric::ZoneSummary => "zone summary",
            Metric::Projection => "geographic projection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A derived metric was skipped because its input columns are absent.
    MissingColumn {
        metric: Metric,
        columns: Vec<&'static str>,
    },
    /// Rows whose value for a metric was null or non-finite and were left out
    /// of that metric's statistics.
    InvalidValueSkip { metric: Metric, rows: usize },
    /// Two raw headers normalized to the same name; `dropped` lost.
    HeaderCollision {
        column: String,
        kept: String,
        dropped: String,
    },
    /// Rows removed because a required geometry value was null.
    DroppedRows { rows: usize },
    /// Blast dates that could not be parsed and were set to null.
    UnparsedDates { rows: usize },
    /// Length deviation is meaningless when `longitud_real` was copied from the
    /// planned length.
    LengthFromPlan,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::MissingColumn { metric, columns } => write!(
                f,
                "{} not available: missing column(s) {}",
                metric.label(),
                columns.join(", ")
            ),
            Notice::InvalidValueSkip { metric, rows } => write!(
                f,
                "{rows} row(s) with invalid values excluded from {}",
                metric.label()
            ),
            Notice::HeaderCollision {
                column,
                kept,
                dropped,
            } => write!(
                f,
                "headers '{dropped}' and '{kept}' both map to '{column}'; kept '{kept}'"
            ),
            Notice::DroppedRows { rows } => {
                write!(f, "{rows} row(s) dropped for missing x, y or z")
            }
            Notice::UnparsedDates { rows } => {
                write!(f, "{rows} blast date(s) could not be parsed")
            }
            Notice::LengthFromPlan => f.write_str(
                "longitud_real taken from longitud_teo; length deviation not computed",
            ),
        }
    }
}
