#[cfg(feature = "python")]
use pyo3::exceptions::PyRuntimeError;
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

pub type QcResult<T> = Result<T, QcError>;

/// Fatal pipeline errors. Any of these aborts the run before a dataset is
/// produced; non-fatal conditions are reported as [`crate::notice::Notice`].
#[derive(Error, Debug)]
pub enum QcError {
    #[error("Could not read the uploaded file as a spreadsheet: {0}")]
    Parse(String),

    #[error(
        "Missing geometry: no column could resolve {} ({rows} rows affected)",
        .fields.join(", ")
    )]
    MissingGeometry {
        fields: Vec<&'static str>,
        rows: usize,
    },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration: {0}")]
    Config(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),
}

impl From<calamine::Error> for QcError {
    fn from(err: calamine::Error) -> Self {
        QcError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for QcError {
    fn from(err: serde_yaml::Error) -> Self {
        QcError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for QcError {
    fn from(err: serde_json::Error) -> Self {
        QcError::InvalidData(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<QcError> for PyErr {
    fn from(err: QcError) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_geometry_names_every_field() {
        let err = QcError::MissingGeometry {
            fields: vec!["x", "z"],
            rows: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("x, z"));
        assert!(msg.contains("12 rows"));
    }
}
