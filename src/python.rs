//! Python extension module for the dashboard front-end.

use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::config::PipelineConfig;
use crate::display;
use crate::error::QcError;
use crate::export;
use crate::filter::{self, DateRange, ViewFilter};
use crate::loader::InputFormat;
use crate::pipeline::{ProcessedDataset, Session};
use crate::projection::{self, Hemisphere};
use crate::schema;

/// One upload session: the processed dataset plus the cache of earlier runs.
#[pyclass]
pub struct BlastDataset {
    session: Session,
}

#[pymethods]
impl BlastDataset {
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => PipelineConfig::from_yaml(path)?,
            None => PipelineConfig::default(),
        };
        Ok(Self {
            session: Session::new(config),
        })
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Process uploaded bytes. `filename` only selects the reader
    /// (spreadsheet or CSV). Unchanged uploads are served from the cache.
    /// A failed upload unloads the previous dataset.
    fn load_bytes(&mut self, data: &[u8], filename: &str) -> PyResult<PyDataFrame> {
        let format = InputFormat::from_path(Path::new(filename));
        let dataset = self.session.load_bytes(data, format)?;
        Ok(PyDataFrame(dataset.table.clone()))
    }

    fn load_file(&mut self, path: &str) -> PyResult<PyDataFrame> {
        let bytes = std::fs::read(path).map_err(QcError::from)?;
        self.load_bytes(&bytes, path)
    }

    /// Adjust the diameter tolerance. The loaded table's
    /// `diametro_fuera_tol` column is re-flagged right away.
    fn set_diameter_tolerance(&mut self, tolerance_mm: f64) -> PyResult<()> {
        Ok(self.session.set_diameter_tolerance(tolerance_mm)?)
    }

    // ── Views ───────────────────────────────────────────────────────────────

    /// Filtered table. `filter_json` is a serialized `ViewFilter`, e.g.
    /// `{"date_range": {"between": ["2024-03-01", "2024-03-31"]},
    ///   "selections": {"banco": ["B1"]}}`.
    #[pyo3(signature = (filter_json=None))]
    fn view(&self, filter_json: Option<&str>) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.filtered(filter_json)?))
    }

    #[pyo3(signature = (filter_json=None))]
    fn report_json(&self, filter_json: Option<&str>) -> PyResult<String> {
        let view = self.filtered(filter_json)?;
        let report = self.dataset()?.report(&view, self.session.config())?;
        Ok(report.to_json()?)
    }

    #[pyo3(signature = (filter_json=None))]
    fn zone_summary(&self, filter_json: Option<&str>) -> PyResult<Option<PyDataFrame>> {
        let view = self.filtered(filter_json)?;
        Ok(self.dataset()?.zone_summary(&view)?.map(PyDataFrame))
    }

    /// Filtered table re-flagged against the current diameter tolerance,
    /// with the nominal diameter of that view.
    #[pyo3(signature = (filter_json=None))]
    fn diameter_flags(&self, filter_json: Option<&str>) -> PyResult<(PyDataFrame, Option<f64>)> {
        let view = self.filtered(filter_json)?;
        let (df, nominal) = self
            .dataset()?
            .flag_diameter_tolerance(&view, self.session.config().quality.diameter_tolerance_mm)?;
        Ok((PyDataFrame(df), nominal))
    }

    fn notices(&self) -> PyResult<Vec<String>> {
        Ok(self
            .dataset()?
            .notices
            .iter()
            .map(ToString::to_string)
            .collect())
    }

    fn capabilities_json(&self) -> PyResult<String> {
        Ok(serde_json::to_string(&self.dataset()?.capabilities).map_err(QcError::from)?)
    }

    fn hover_fields(&self) -> PyResult<Vec<(&'static str, &'static str)>> {
        Ok(self.dataset()?.hover_fields())
    }

    // ── Filter controls ─────────────────────────────────────────────────────

    fn default_date_range(&self) -> PyResult<Option<(NaiveDate, NaiveDate)>> {
        let range = filter::default_date_range(
            &self.dataset()?.table,
            self.session.config().filters.default_window_days,
        )?;
        Ok(range.map(|r| match r {
            DateRange::Day(d) => (d, d),
            DateRange::Between(a, b) => (a, b),
        }))
    }

    fn filterable_columns(&self) -> PyResult<Vec<String>> {
        Ok(filter::filterable_columns(&self.dataset()?.table)?)
    }

    fn filter_options(&self, column: &str) -> PyResult<Vec<String>> {
        Ok(filter::filter_options(&self.dataset()?.table, column)?)
    }

    #[pyo3(signature = (filter_json=None))]
    fn categorical_columns(&self, filter_json: Option<&str>) -> PyResult<Vec<String>> {
        let view = self.filtered(filter_json)?;
        Ok(filter::categorical_columns(
            &view,
            self.session.config().filters.max_categories,
        )?)
    }

    #[pyo3(signature = (column, filter_json=None))]
    fn category_counts(&self, column: &str, filter_json: Option<&str>) -> PyResult<PyDataFrame> {
        let view = self.filtered(filter_json)?;
        Ok(PyDataFrame(filter::category_counts(&view, column)?))
    }

    // ── Export ──────────────────────────────────────────────────────────────

    #[pyo3(signature = (path, filter_json=None))]
    fn export_csv(&self, path: &str, filter_json: Option<&str>) -> PyResult<()> {
        Ok(export::write_csv(&self.filtered(filter_json)?, path)?)
    }

    #[pyo3(signature = (path, filter_json=None))]
    fn export_parquet(&self, path: &str, filter_json: Option<&str>) -> PyResult<()> {
        Ok(export::write_parquet(&self.filtered(filter_json)?, path)?)
    }
}

impl BlastDataset {
    fn dataset(&self) -> PyResult<&ProcessedDataset> {
        self.session
            .current()
            .ok_or_else(|| PyValueError::new_err("No dataset loaded. Call load_bytes first."))
    }

    fn filtered(&self, filter_json: Option<&str>) -> PyResult<DataFrame> {
        let dataset = self.dataset()?;
        let filter: ViewFilter = match filter_json {
            Some(json) => serde_json::from_str(json).map_err(QcError::from)?,
            None => ViewFilter::default(),
        };
        Ok(dataset.view(&filter)?)
    }
}

/// Convert one UTM coordinate; `letter` selects the hemisphere.
#[pyfunction]
fn utm_to_latlon(easting: f64, northing: f64, zone: u8, letter: char) -> PyResult<(f64, f64)> {
    let hemisphere = Hemisphere::from_letter(letter)
        .ok_or_else(|| PyValueError::new_err(format!("Unknown UTM zone letter '{letter}'")))?;
    Ok(projection::utm_to_latlon(easting, northing, zone, hemisphere)?)
}

#[pyfunction]
fn inches_to_mixed(inches: f64) -> String {
    display::inches_to_mixed(inches)
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Geometry
    let geometry = PyModule::new(m.py(), "geometry")?;
    geometry.add("X", schema::geometry::X)?;
    geometry.add("Y", schema::geometry::Y)?;
    geometry.add("Z", schema::geometry::Z)?;
    geometry.add("ESTE", schema::geometry::ESTE)?;
    geometry.add("NORTE", schema::geometry::NORTE)?;
    geometry.add("COTA", schema::geometry::COTA)?;
    geometry.add("PROFUNDIDAD", schema::geometry::PROFUNDIDAD)?;
    m.add_submodule(&geometry)?;

    // Hole
    let hole = PyModule::new(m.py(), "hole")?;
    hole.add("NUMERO", schema::hole::NUMERO)?;
    hole.add("LONGITUD_REAL", schema::hole::LONGITUD_REAL)?;
    hole.add("LONGITUD_TEO", schema::hole::LONGITUD_TEO)?;
    hole.add("KILOS_CARGADOS_REAL", schema::hole::KILOS_CARGADOS_REAL)?;
    hole.add("DIAMETRO", schema::hole::DIAMETRO)?;
    hole.add("FECHA_TRONADURA", schema::hole::FECHA_TRONADURA)?;
    m.add_submodule(&hole)?;

    // Zone
    let zone = PyModule::new(m.py(), "zone")?;
    zone.add("HOLES_POLYGON", schema::zone::HOLES_POLYGON)?;
    zone.add("BANCO", schema::zone::BANCO)?;
    zone.add("ZONA", schema::zone::ZONA)?;
    m.add_submodule(&zone)?;

    // Derived
    let derived = PyModule::new(m.py(), "derived")?;
    derived.add("FACTOR_CARGA", schema::derived::FACTOR_CARGA)?;
    derived.add("DESVIACION_PCT", schema::derived::DESVIACION_PCT)?;
    derived.add("CLASIFICACION", schema::derived::CLASIFICACION)?;
    derived.add("DIAMETRO_FUERA_TOL", schema::derived::DIAMETRO_FUERA_TOL)?;
    derived.add("DIAMETRO_PULGADAS", schema::derived::DIAMETRO_PULGADAS)?;
    derived.add(
        "DIAMETRO_PULGADAS_STR",
        schema::derived::DIAMETRO_PULGADAS_STR,
    )?;
    derived.add("FECHA_TRONADURA_STR", schema::derived::FECHA_TRONADURA_STR)?;
    m.add_submodule(&derived)?;

    // Zone summary
    let zone_summary = PyModule::new(m.py(), "zone_summary")?;
    zone_summary.add("TOTAL_KG", schema::zone_summary::TOTAL_KG)?;
    zone_summary.add("TOTAL_LONG", schema::zone_summary::TOTAL_LONG)?;
    zone_summary.add("N_POZOS", schema::zone_summary::N_POZOS)?;
    zone_summary.add("KG_POR_M", schema::zone_summary::KG_POR_M)?;
    m.add_submodule(&zone_summary)?;

    // Classification
    let classification = PyModule::new(m.py(), "classification")?;
    classification.add("UNDER_DRILLED", schema::classification::UNDER_DRILLED)?;
    classification.add("WITHIN_TOLERANCE", schema::classification::WITHIN_TOLERANCE)?;
    classification.add("OVER_DRILLED", schema::classification::OVER_DRILLED)?;
    m.add_submodule(&classification)?;

    // Projection
    let projection = PyModule::new(m.py(), "projection")?;
    projection.add("ZONE_NUMBER", schema::projection::ZONE_NUMBER)?;
    projection.add("ZONE_LETTER", schema::projection::ZONE_LETTER)?;
    projection.add("LATITUD", schema::projection::LATITUD)?;
    projection.add("LONGITUD", schema::projection::LONGITUD)?;
    m.add_submodule(&projection)?;

    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<BlastDataset>()?;
    m.add_function(wrap_pyfunction!(utm_to_latlon, m)?)?;
    m.add_function(wrap_pyfunction!(inches_to_mixed, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
