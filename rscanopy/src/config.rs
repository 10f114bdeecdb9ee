use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChmError, Result};

/// Nodata sentinel written by the elevation engines and masked by the
/// compositor. Matches the `nodata` option of the pipeline templates.
pub const NO_DATA: f32 = -10.0;

/// Canopy below this height is masked to zero (6 ft).
pub const DEFAULT_MIN_CANOPY_HEIGHT_M: f32 = 1.83;

/// Output cell size in metres.
pub const DEFAULT_RESOLUTION_M: f64 = 1.0;

/// Time limit for one external engine invocation, in seconds.
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 600;

/// Settings shared by single-tile, batch and merge runs.
///
/// Every field has a default, so a config file only needs the fields it
/// wants to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output cell size in metres
    pub resolution: f64,
    /// Canopy height mask threshold in metres
    pub min_canopy_height: f32,
    /// EPSG code stamped on rasters produced by the native engine
    pub crs_epsg: Option<u32>,
    /// Keep the per-tile DTM/DSM instead of deleting them after compositing
    pub keep_intermediate: bool,
    /// Time limit for one external engine invocation, in seconds
    pub engine_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            resolution: DEFAULT_RESOLUTION_M,
            min_canopy_height: DEFAULT_MIN_CANOPY_HEIGHT_M,
            crs_epsg: None,
            keep_intermediate: false,
            engine_timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
        }
    }
}

impl PipelineConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)
            .map_err(|e| ChmError::PipelineConfig(format!("config file {:?}: {}", path, e)))?;
        Ok(config)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.resolution, 1.0);
        assert_eq!(config.min_canopy_height, 1.83);
        assert_eq!(config.crs_epsg, None);
        assert!(!config.keep_intermediate);
        assert_eq!(config.engine_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{ "resolution": 0.5, "crs_epsg": 2154 }}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.resolution, 0.5);
        assert_eq!(config.crs_epsg, Some(2154));
        assert_eq!(config.min_canopy_height, DEFAULT_MIN_CANOPY_HEIGHT_M);
        assert_eq!(config.engine_timeout_secs, DEFAULT_ENGINE_TIMEOUT_SECS);
    }

    #[test]
    fn test_malformed_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ChmError::PipelineConfig(_)));
    }
}
