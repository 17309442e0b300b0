//! Normalization and quality metrics for blast-hole drilling and loading
//! records.
//!
//! An uploaded spreadsheet goes through [`pipeline::process_bytes`]: headers
//! are canonicalized, `x`/`y`/`z` resolved, incomplete rows dropped and the
//! derived indicators added. The resulting [`ProcessedDataset`] is filtered
//! with a [`ViewFilter`] and summarized with a [`QualityReport`].

pub mod capabilities;
pub mod clean;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod filter;
pub mod geometry;
pub mod loader;
pub mod metrics;
pub mod normalize;
pub mod notice;
pub mod pipeline;
pub mod projection;
pub mod report;
pub mod schema;
pub mod telemetry;

#[cfg(feature = "python")]
mod python;

pub use capabilities::Capabilities;
pub use config::PipelineConfig;
pub use error::{QcError, QcResult};
pub use filter::{DateRange, ViewFilter};
pub use loader::InputFormat;
pub use notice::{Metric, Notice};
pub use pipeline::{
    process_bytes, process_frame, process_path, DatasetCache, ProcessedDataset, Session,
};
pub use projection::Hemisphere;
pub use report::QualityReport;
