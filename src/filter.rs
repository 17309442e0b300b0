//! Session filters: date window and categorical multi-select.
//!
//! A [`ViewFilter`] is applied to the processed table to produce a new frame;
//! the processed table itself is never modified.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use polars::prelude::*;

use crate::error::{QcError, QcResult};
use crate::schema::{derived, geometry, hole, projection, zone};

/// Columns never offered as multi-select filters.
pub const NON_FILTERABLE: &[&str] = &[
    geometry::X,
    geometry::Y,
    geometry::Z,
    "holes_dateupdated",
    "camion",
    hole::LONGITUD_TEO,
    "uniqid",
    hole::FECHA_TRONADURA,
    hole::NUMERO,
    "id_pozo",
    geometry::ESTE,
    geometry::NORTE,
    hole::KILOS_CARGADOS_REAL,
    "nombre",
    "inclinacion_real",
    "azimuth_real",
    hole::DIAMETRO,
    "stemming_real",
    "water_level",
    "number_primes",
];

/// Columns never offered as categorical breakdowns.
pub const NON_CATEGORICAL: &[&str] = &[
    geometry::ESTE,
    geometry::NORTE,
    geometry::COTA,
    geometry::X,
    geometry::Y,
    geometry::Z,
    derived::FACTOR_CARGA,
    hole::KILOS_CARGADOS_REAL,
    hole::LONGITUD_REAL,
];

/// Name of the count column in [`category_counts`].
pub const COUNT: &str = "count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Day(NaiveDate),
    /// Inclusive on both ends.
    Between(NaiveDate, NaiveDate),
}

impl DateRange {
    fn bounds(self) -> (NaiveDate, NaiveDate) {
        match self {
            DateRange::Day(d) => (d, d),
            DateRange::Between(a, b) if a <= b => (a, b),
            DateRange::Between(a, b) => (b, a),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewFilter {
    /// Rows without a blast date are excluded while a range is set.
    #[serde(default)]
    pub date_range: Option<DateRange>,

    /// Column → accepted values, compared as text. An empty list selects
    /// everything.
    #[serde(default)]
    pub selections: BTreeMap<String, Vec<String>>,
}

impl ViewFilter {
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn select<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selections
            .insert(column.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.date_range.is_none() && self.selections.values().all(Vec::is_empty)
    }

    /// Filter `df` into a new frame.
    ///
    /// A date range on a table without `fecha_tronadura` is ignored. Selecting
    /// on a column the table does not have is an error.
    pub fn apply(&self, df: &DataFrame) -> QcResult<DataFrame> {
        let schema = df.schema();
        let mut predicates = Vec::new();

        if let Some(range) = self.date_range {
            if schema.get(hole::FECHA_TRONADURA) == Some(&DataType::Date) {
                let (start, end) = range.bounds();
                let days = col(hole::FECHA_TRONADURA).cast(DataType::Int32);
                predicates.push(
                    days.clone()
                        .gt_eq(lit(epoch_days(start)))
                        .and(days.lt_eq(lit(epoch_days(end)))),
                );
            }
        }

        for (column, values) in &self.selections {
            if values.is_empty() {
                continue;
            }
            if !schema.contains(column) {
                return Err(QcError::MissingColumn(format!(
                    "cannot filter on '{column}': column not in table"
                )));
            }
            let accepted = Series::new("accepted".into(), values.as_slice());
            predicates.push(
                col(column.as_str())
                    .cast(DataType::String)
                    .is_in(lit(accepted), false),
            );
        }

        let Some(predicate) = predicates.into_iter().reduce(|acc, p| acc.and(p)) else {
            return Ok(df.clone());
        };
        let view = df.clone().lazy().filter(predicate).collect()?;
        debug!(rows = df.height(), kept = view.height(), "applied view filter");
        Ok(view)
    }
}

/// Earliest and latest blast date, if any row has one.
pub fn date_bounds(df: &DataFrame) -> QcResult<Option<(NaiveDate, NaiveDate)>> {
    if df.schema().get(hole::FECHA_TRONADURA) != Some(&DataType::Date) {
        return Ok(None);
    }
    let days = df
        .column(hole::FECHA_TRONADURA)?
        .cast(&DataType::Int32)?;
    let days = days.i32()?;
    Ok(days
        .min()
        .zip(days.max())
        .map(|(lo, hi)| (from_epoch_days(lo), from_epoch_days(hi))))
}

/// The last `window_days` of available data, clamped to the earliest date.
/// A single available date gives [`DateRange::Day`].
pub fn default_date_range(df: &DataFrame, window_days: i64) -> QcResult<Option<DateRange>> {
    Ok(date_bounds(df)?.map(|(min, max)| {
        if min == max {
            DateRange::Day(min)
        } else {
            DateRange::Between(min.max(max - Duration::days(window_days)), max)
        }
    }))
}

/// Coordinates added by projection.
const COMPUTED: [&str; 2] = [projection::LATITUD, projection::LONGITUD];

/// Columns offered as multi-select filters: more than one distinct non-null
/// value, not in [`NON_FILTERABLE`] and not computed by the pipeline.
pub fn filterable_columns(df: &DataFrame) -> QcResult<Vec<String>> {
    let mut out = Vec::new();
    for name in df.get_column_names_str() {
        let lower = name.to_lowercase();
        if NON_FILTERABLE.contains(&lower.as_str())
            || derived::ALL.contains(&lower.as_str())
            || COMPUTED.contains(&lower.as_str())
        {
            continue;
        }
        if distinct_values(df, name)? > 1 {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

/// Sorted distinct non-null values of `column`, rendered as text.
pub fn filter_options(df: &DataFrame, column: &str) -> QcResult<Vec<String>> {
    let options = df
        .clone()
        .lazy()
        .select([col(column)
            .drop_nulls()
            .unique()
            .sort(SortOptions::default())
            .cast(DataType::String)])
        .collect()?;
    Ok(options
        .column(column)?
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

/// Non-numeric columns with between two and `max_categories` distinct values,
/// usable for categorical breakdowns.
pub fn categorical_columns(df: &DataFrame, max_categories: usize) -> QcResult<Vec<String>> {
    let mut out = Vec::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if NON_CATEGORICAL.contains(&name) || column.dtype().is_primitive_numeric() {
            continue;
        }
        let n = distinct_values(df, name)?;
        if (2..=max_categories).contains(&n) {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

/// Occurrences per value of `column`, most frequent first. Nulls are not
/// counted.
pub fn category_counts(df: &DataFrame, column: &str) -> QcResult<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .filter(col(column).is_not_null())
        .group_by([col(column)])
        .agg([len().alias(COUNT)])
        .sort(
            [COUNT, column],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?)
}

/// Zone keys present in `df`, in priority order.
pub fn zone_keys(df: &DataFrame) -> Vec<&'static str> {
    let schema = df.schema();
    zone::PRIORITY
        .iter()
        .copied()
        .filter(|k| schema.contains(k))
        .collect()
}

fn distinct_values(df: &DataFrame, column: &str) -> QcResult<usize> {
    let counted = df
        .clone()
        .lazy()
        .select([col(column).drop_nulls().n_unique().cast(DataType::UInt32)])
        .collect()?;
    Ok(counted.column(column)?.u32()?.get(0).unwrap_or(0) as usize)
}

fn epoch_days(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

fn from_epoch_days(days: i32) -> NaiveDate {
    NaiveDate::default() + Duration::days(days as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dated(days: &[Option<NaiveDate>]) -> DataFrame {
        let raw: Vec<Option<i32>> = days.iter().map(|d| d.map(epoch_days)).collect();
        let dates = Column::new("fecha_tronadura".into(), raw)
            .cast(&DataType::Date)
            .unwrap();
        let n = days.len() as i32;
        let mut df = df!(
            "banco" => (0..n).map(|i| if i % 2 == 0 { "B1" } else { "B2" }).collect::<Vec<_>>(),
            "numero" => (0..n).collect::<Vec<_>>(),
        )
        .unwrap();
        df.with_column(dates).unwrap();
        df
    }

    #[test]
    fn epoch_is_unix() {
        assert_eq!(epoch_days(ymd(1970, 1, 1)), 0);
        assert_eq!(epoch_days(ymd(2024, 3, 5)), 19787);
    }

    #[test]
    fn default_window_is_last_thirty_days() {
        let df = dated(&[Some(ymd(2024, 1, 1)), Some(ymd(2024, 3, 31)), None]);
        assert_eq!(
            default_date_range(&df, 30).unwrap(),
            Some(DateRange::Between(ymd(2024, 3, 1), ymd(2024, 3, 31)))
        );

        let df = dated(&[Some(ymd(2024, 3, 20)), Some(ymd(2024, 3, 31))]);
        assert_eq!(
            default_date_range(&df, 30).unwrap(),
            Some(DateRange::Between(ymd(2024, 3, 20), ymd(2024, 3, 31)))
        );

        let df = dated(&[Some(ymd(2024, 3, 20))]);
        assert_eq!(
            default_date_range(&df, 30).unwrap(),
            Some(DateRange::Day(ymd(2024, 3, 20)))
        );
    }

    #[test]
    fn date_range_is_inclusive_and_drops_undated_rows() {
        let df = dated(&[
            Some(ymd(2024, 3, 1)),
            Some(ymd(2024, 3, 10)),
            Some(ymd(2024, 3, 11)),
            None,
        ]);
        let view = ViewFilter::default()
            .with_date_range(DateRange::Between(ymd(2024, 3, 1), ymd(2024, 3, 10)))
            .apply(&df)
            .unwrap();
        assert_eq!(view.height(), 2);
        assert_eq!(df.height(), 4);

        let view = ViewFilter::default()
            .with_date_range(DateRange::Day(ymd(2024, 3, 11)))
            .apply(&df)
            .unwrap();
        assert_eq!(view.height(), 1);
    }

    #[test]
    fn selections_combine_with_and() {
        let df = dated(&[Some(ymd(2024, 3, 1)); 4]);
        let view = ViewFilter::default()
            .select("banco", ["B2"])
            .select("numero", ["1", "2"])
            .apply(&df)
            .unwrap();
        assert_eq!(view.height(), 1);
        assert_eq!(view.column("numero").unwrap().i32().unwrap().get(0), Some(1));
    }

    #[test]
    fn empty_selection_keeps_everything() {
        let df = dated(&[Some(ymd(2024, 3, 1)); 3]);
        let filter = ViewFilter::default().select("banco", Vec::<String>::new());
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&df).unwrap().height(), 3);
    }

    #[test]
    fn unknown_selection_column_is_an_error() {
        let df = dated(&[Some(ymd(2024, 3, 1))]);
        let err = ViewFilter::default().select("malla", ["M1"]).apply(&df).unwrap_err();
        assert!(err.to_string().contains("malla"));
    }

    #[test]
    fn filterable_and_categorical_columns() {
        let df = df!(
            "banco" => ["B1", "B2", "B1"],
            "numero" => ["1", "2", "3"],
            "tipo" => ["A", "A", "A"],
            "Camion" => ["C1", "C2", "C3"],
            "kg" => [1.0, 2.0, 3.0],
        )
        .unwrap();
        assert_eq!(filterable_columns(&df).unwrap(), vec!["banco", "kg"]);
        assert_eq!(categorical_columns(&df, 20).unwrap(), vec!["banco", "numero", "Camion"]);
        assert_eq!(categorical_columns(&df, 2).unwrap(), vec!["banco"]);
        assert_eq!(filter_options(&df, "banco").unwrap(), vec!["B1", "B2"]);
    }

    #[test]
    fn computed_columns_are_not_filters() {
        let df = df!(
            "banco" => ["B1", "B2"],
            "clasificacion" => ["over-drilled", "under-drilled"],
            "fecha_tronadura_str" => ["01-03-2024", "02-03-2024"],
            "latitud" => [-33.1, -33.2],
            "longitud" => [-70.1, -70.2],
        )
        .unwrap();
        assert_eq!(filterable_columns(&df).unwrap(), vec!["banco"]);
    }

    #[test]
    fn counts_are_descending() {
        let df = df!("banco" => [Some("B2"), Some("B1"), Some("B1"), None]).unwrap();
        let counts = category_counts(&df, "banco").unwrap();
        assert_eq!(counts.column("banco").unwrap().str().unwrap().get(0), Some("B1"));
        assert_eq!(counts.column(COUNT).unwrap().u32().unwrap().get(0), Some(2));
        assert_eq!(counts.height(), 2);
    }
}
