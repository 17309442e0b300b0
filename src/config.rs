//! Configuration types for the processing pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QcError, QcResult};
use crate::projection::Hemisphere;

/// Thresholds for the quality indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Half-width of the accepted length deviation band, in percent
    #[serde(default = "default_deviation_band_pct")]
    pub deviation_band_pct: f64,

    /// Accepted distance from the nominal diameter, in millimeters
    #[serde(default = "default_diameter_tolerance_mm")]
    pub diameter_tolerance_mm: f64,
}

fn default_deviation_band_pct() -> f64 {
    5.0
}

fn default_diameter_tolerance_mm() -> f64 {
    3.0
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            deviation_band_pct: default_deviation_band_pct(),
            diameter_tolerance_mm: default_diameter_tolerance_mm(),
        }
    }
}

/// Blast date parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateConfig {
    /// chrono format strings tried in order on text dates
    #[serde(default = "default_date_formats")]
    pub formats: Vec<String>,
}

fn default_date_formats() -> Vec<String> {
    [
        "%Y-%m-%d",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%Y/%m/%d",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            formats: default_date_formats(),
        }
    }
}

/// UTM to geographic conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Add latitud/longitud columns during processing
    #[serde(default)]
    pub enabled: bool,

    /// Zone used when rows carry no zone number
    #[serde(default = "default_zone")]
    pub default_zone: u8,

    /// Hemisphere used when rows carry no zone letter
    #[serde(default = "default_hemisphere")]
    pub default_hemisphere: Hemisphere,
}

fn default_zone() -> u8 {
    18
}

fn default_hemisphere() -> Hemisphere {
    Hemisphere::South
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_zone: default_zone(),
            default_hemisphere: default_hemisphere(),
        }
    }
}

/// Defaults for the session filter controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Length of the default date window ending at the latest blast
    #[serde(default = "default_window_days")]
    pub default_window_days: i64,

    /// Columns with more distinct values are not offered as categories
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,
}

fn default_window_days() -> i64 {
    30
}

fn default_max_categories() -> usize {
    20
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_window_days: default_window_days(),
            max_categories: default_max_categories(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub dates: DateConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub filters: FilterConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> QcResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> QcResult<Self> {
        let config: PipelineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> QcResult<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> QcResult<()> {
        let q = &self.quality;
        if !q.deviation_band_pct.is_finite() || q.deviation_band_pct < 0.0 {
            return Err(QcError::Config(format!(
                "deviation_band_pct must be a non-negative number, got {}",
                q.deviation_band_pct
            )));
        }
        if !q.diameter_tolerance_mm.is_finite() || q.diameter_tolerance_mm < 0.0 {
            return Err(QcError::Config(format!(
                "diameter_tolerance_mm must be a non-negative number, got {}",
                q.diameter_tolerance_mm
            )));
        }
        if !(1..=60).contains(&self.projection.default_zone) {
            return Err(QcError::Config(format!(
                "default_zone must be between 1 and 60, got {}",
                self.projection.default_zone
            )));
        }
        if self.dates.formats.is_empty() {
            return Err(QcError::Config("dates.formats must not be empty".into()));
        }
        if self.filters.default_window_days < 0 {
            return Err(QcError::Config(format!(
                "default_window_days must not be negative, got {}",
                self.filters.default_window_days
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.quality.deviation_band_pct, 5.0);
        assert_eq!(config.quality.diameter_tolerance_mm, 3.0);
        assert!(!config.projection.enabled);
        assert_eq!(config.projection.default_zone, 18);
        assert_eq!(config.projection.default_hemisphere, Hemisphere::South);
        assert_eq!(config.filters.default_window_days, 30);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = PipelineConfig::from_yaml_str(
            "quality:\n  diameter_tolerance_mm: 1.5\nprojection:\n  enabled: true\n  default_zone: 19\n",
        )
        .unwrap();
        assert_eq!(config.quality.diameter_tolerance_mm, 1.5);
        assert_eq!(config.quality.deviation_band_pct, 5.0);
        assert!(config.projection.enabled);
        assert_eq!(config.projection.default_zone, 19);
        assert!(!config.dates.formats.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_zone() {
        let err = PipelineConfig::from_yaml_str("projection:\n  default_zone: 61\n").unwrap_err();
        assert!(matches!(err, QcError::Config(_)));
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        let err =
            PipelineConfig::from_yaml_str("quality:\n  diameter_tolerance_mm: -1.0\n").unwrap_err();
        assert!(err.to_string().contains("diameter_tolerance_mm"));
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        let mut config = PipelineConfig::default();
        config.quality.deviation_band_pct = 7.5;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.quality.deviation_band_pct, 7.5);
    }
}
