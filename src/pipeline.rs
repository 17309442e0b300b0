use std::collections::{HashMap, VecDeque};
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};
use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

use crate::capabilities::Capabilities;
use crate::clean;
use crate::config::PipelineConfig;
use crate::display;
use crate::error::QcResult;
use crate::filter::ViewFilter;
use crate::geometry;
use crate::loader::{self, InputFormat};
use crate::metrics;
use crate::normalize;
use crate::notice::Notice;
use crate::projection;
use crate::report::QualityReport;
use crate::schema::derived;

/// The canonical table built from one upload, with everything known about it.
#[derive(Debug, Clone)]
pub struct ProcessedDataset {
    pub table: DataFrame,
    pub capabilities: Capabilities,
    pub notices: Vec<Notice>,
    /// Digest of the source bytes and configuration; `None` for frames
    /// processed directly.
    pub digest: Option<u64>,
}

impl ProcessedDataset {
    pub fn height(&self) -> usize {
        self.table.height()
    }

    /// Filtered copy of the table.
    pub fn view(&self, filter: &ViewFilter) -> QcResult<DataFrame> {
        filter.apply(&self.table)
    }

    /// Quality summary of `view`, usually the output of [`Self::view`].
    pub fn report(&self, view: &DataFrame, config: &PipelineConfig) -> QcResult<QualityReport> {
        QualityReport::compute(view, &self.capabilities, &config.quality, &self.notices)
    }

    /// Re-flag the diameters of `view` against a different tolerance.
    pub fn flag_diameter_tolerance(
        &self,
        view: &DataFrame,
        tolerance_mm: f64,
    ) -> QcResult<(DataFrame, Option<f64>)> {
        metrics::flag_diameter_tolerance(view.clone(), tolerance_mm)
    }

    pub fn zone_summary(&self, view: &DataFrame) -> QcResult<Option<DataFrame>> {
        metrics::zone_summary(view, &self.capabilities)
    }

    pub fn hover_fields(&self) -> Vec<(&'static str, &'static str)> {
        display::hover_fields(&self.table)
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Load and process an uploaded file.
pub fn process_bytes(
    bytes: &[u8],
    format: InputFormat,
    config: &PipelineConfig,
) -> QcResult<ProcessedDataset> {
    let digest = upload_digest(bytes, config)?;
    let raw = loader::load_bytes(bytes, format)?;
    let mut dataset = process_frame(raw, config)?;
    dataset.digest = Some(digest);
    Ok(dataset)
}

pub fn process_path<P: AsRef<Path>>(
    path: P,
    config: &PipelineConfig,
) -> QcResult<ProcessedDataset> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    process_bytes(&bytes, InputFormat::from_path(path), config)
}

/// Run every stage on an already loaded raw table.
///
/// Either the whole dataset is produced or the first fatal error is returned.
pub fn process_frame(raw: DataFrame, config: &PipelineConfig) -> QcResult<ProcessedDataset> {
    config.validate()?;
    let raw_rows = raw.height();

    let normalized = normalize::normalize(raw)?;
    let mut notices = normalized.notices;
    let length_from_plan = normalized.length_from_plan;

    let df = strip_derived(normalized.frame);
    let df = geometry::resolve_geometry(df)?;

    let cleaned = clean::clean(df, &config.dates)?;
    notices.extend(cleaned.notices);
    let df = cleaned.frame;

    let caps = Capabilities::detect(&df, length_from_plan);
    debug!(?caps, "detected capabilities");

    let quality = &config.quality;
    let df = metrics::with_load_factor(df, &caps, &mut notices)?;
    let df = metrics::with_length_deviation(df, &caps, quality.deviation_band_pct, &mut notices)?;
    let df = metrics::with_diameter_tolerance(
        df,
        &caps,
        quality.diameter_tolerance_mm,
        &mut notices,
    )?;
    let mut df = display::with_display_columns(df)?;

    if config.projection.enabled {
        df = projection::add_geographic_coordinates(df, &config.projection, &caps, &mut notices)?;
    }

    info!(
        raw_rows,
        rows = df.height(),
        columns = df.width(),
        notices = notices.len(),
        "processed dataset"
    );

    Ok(ProcessedDataset {
        table: df,
        capabilities: caps,
        notices,
        digest: None,
    })
}

/// Derived columns are always recomputed, so uploaded copies are dropped.
fn strip_derived(df: DataFrame) -> DataFrame {
    let present: Vec<&str> = derived::ALL
        .iter()
        .copied()
        .filter(|name| df.schema().contains(name))
        .collect();
    if present.is_empty() {
        return df;
    }
    debug!(columns = ?present, "dropping uploaded derived columns");
    df.drop_many(present)
}

/// Content digest of an upload under a given configuration.
pub fn upload_digest(bytes: &[u8], config: &PipelineConfig) -> QcResult<u64> {
    let seed = xxh3_64(serde_json::to_string(config)?.as_bytes());
    Ok(xxh3_64_with_seed(bytes, seed))
}

// ── Cache ───────────────────────────────────────────────────────────────────

/// Number of processed datasets a [`DatasetCache`] keeps by default.
pub const DEFAULT_CACHE_CAPACITY: usize = 4;

/// Processed datasets keyed by [`upload_digest`], owned by the caller.
///
/// Bounded: once full, the least recently used dataset is evicted.
#[derive(Debug)]
pub struct DatasetCache {
    entries: HashMap<u64, ProcessedDataset>,
    // least recently used first
    order: VecDeque<u64>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` datasets (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached dataset for these bytes, processing them on a miss.
    /// A failed run leaves the cache unchanged.
    pub fn get_or_process(
        &mut self,
        bytes: &[u8],
        format: InputFormat,
        config: &PipelineConfig,
    ) -> QcResult<&ProcessedDataset> {
        let digest = upload_digest(bytes, config)?;
        if self.entries.contains_key(&digest) {
            self.hits += 1;
            self.order.retain(|d| *d != digest);
            debug!(digest, "dataset cache hit");
        } else {
            self.misses += 1;
            let dataset = process_bytes(bytes, format, config)?;
            while self.entries.len() >= self.capacity {
                let Some(evicted) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&evicted);
                debug!(digest = evicted, "evicted cached dataset");
            }
            self.entries.insert(digest, dataset);
        }
        self.order.push_back(digest);
        Ok(&self.entries[&digest])
    }

    pub fn get(&self, digest: u64) -> Option<&ProcessedDataset> {
        self.entries.get(&digest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

/// One user's upload session: the active configuration, the cache of earlier
/// runs and the dataset currently on screen.
#[derive(Debug, Default)]
pub struct Session {
    config: PipelineConfig,
    cache: DatasetCache,
    current: Option<ProcessedDataset>,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cache: DatasetCache::new(),
            current: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    pub fn current(&self) -> Option<&ProcessedDataset> {
        self.current.as_ref()
    }

    /// Process an upload and make it the current dataset.
    ///
    /// The previous dataset is dropped first, so a failed upload leaves the
    /// session empty.
    pub fn load_bytes(
        &mut self,
        bytes: &[u8],
        format: InputFormat,
    ) -> QcResult<&ProcessedDataset> {
        self.current = None;
        let dataset = self.cache.get_or_process(bytes, format, &self.config)?.clone();
        Ok(self.current.insert(dataset))
    }

    /// Switch the diameter tolerance and re-flag the current table with it.
    pub fn set_diameter_tolerance(&mut self, tolerance_mm: f64) -> QcResult<()> {
        let mut config = self.config.clone();
        config.quality.diameter_tolerance_mm = tolerance_mm;
        config.validate()?;

        if let Some(dataset) = self.current.as_mut() {
            if dataset.capabilities.diameter {
                let (table, _) =
                    metrics::flag_diameter_tolerance(dataset.table.clone(), tolerance_mm)?;
                dataset.table = table;
            }
        }
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QcError;

    const CSV: &[u8] = b"Este,Norte,Cota,Kilos Cargados Real,Longitud Real,Factor Carga\n\
        1.0,2.0,3.0,50.0,10.0,99.0\n";

    #[test]
    fn uploaded_derived_columns_are_recomputed() {
        let dataset = process_bytes(CSV, InputFormat::Csv, &PipelineConfig::default()).unwrap();
        let fc = dataset.table.column("factor_carga").unwrap().f64().unwrap();
        assert_eq!(fc.get(0), Some(5.0));
        assert!(dataset.digest.is_some());
    }

    #[test]
    fn cache_reuses_identical_uploads() {
        let config = PipelineConfig::default();
        let mut cache = DatasetCache::new();
        cache.get_or_process(CSV, InputFormat::Csv, &config).unwrap();
        cache.get_or_process(CSV, InputFormat::Csv, &config).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats(), (1, 1));

        let mut tighter = config.clone();
        tighter.quality.diameter_tolerance_mm = 1.0;
        cache.get_or_process(CSV, InputFormat::Csv, &tighter).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn failed_run_is_not_cached() {
        let mut cache = DatasetCache::new();
        let bytes = b"diametro\n165\n";
        assert!(cache
            .get_or_process(bytes, InputFormat::Csv, &PipelineConfig::default())
            .is_err());
        assert!(cache.is_empty());
    }

    fn upload(n: usize) -> Vec<u8> {
        format!("x,y,z\n{n},1,1\n").into_bytes()
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let config = PipelineConfig::default();
        let mut cache = DatasetCache::with_capacity(2);
        let digests: Vec<u64> = (0..3)
            .map(|n| upload_digest(&upload(n), &config).unwrap())
            .collect();

        cache.get_or_process(&upload(0), InputFormat::Csv, &config).unwrap();
        cache.get_or_process(&upload(1), InputFormat::Csv, &config).unwrap();
        // touching the first upload makes the second the oldest
        cache.get_or_process(&upload(0), InputFormat::Csv, &config).unwrap();
        cache.get_or_process(&upload(2), InputFormat::Csv, &config).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(digests[0]).is_some());
        assert!(cache.get(digests[1]).is_none());
        assert!(cache.get(digests[2]).is_some());

        for n in 3..10 {
            cache.get_or_process(&upload(n), InputFormat::Csv, &config).unwrap();
        }
        assert_eq!(cache.len(), cache.capacity());
    }

    #[test]
    fn failed_upload_clears_the_session() {
        let mut session = Session::default();
        session.load_bytes(CSV, InputFormat::Csv).unwrap();
        assert!(session.current().is_some());

        let err = session
            .load_bytes(b"diametro\n165\n", InputFormat::Csv)
            .unwrap_err();
        assert!(matches!(err, QcError::MissingGeometry { .. }));
        assert!(session.current().is_none());
        assert_eq!(session.cache().len(), 1);
    }

    #[test]
    fn tolerance_change_reflags_the_current_table() {
        let csv = b"x,y,z,diametro\n1,1,1,100\n2,2,2,100\n3,3,3,104\n";
        let mut session = Session::default();
        session.load_bytes(csv, InputFormat::Csv).unwrap();
        let flag = |s: &Session| {
            s.current()
                .unwrap()
                .table
                .column("diametro_fuera_tol")
                .unwrap()
                .bool()
                .unwrap()
                .get(2)
        };
        assert_eq!(flag(&session), Some(true));

        session.set_diameter_tolerance(5.0).unwrap();
        assert_eq!(flag(&session), Some(false));
        assert_eq!(session.config().quality.diameter_tolerance_mm, 5.0);

        assert!(session.set_diameter_tolerance(-1.0).is_err());
        assert_eq!(session.config().quality.diameter_tolerance_mm, 5.0);
    }
}
