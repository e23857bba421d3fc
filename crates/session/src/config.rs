//! Session configuration
//!
//! Stored as JSON. Every field has a default, so partial files are valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use geoshift_algorithms::imagery::StretchParams;
use geoshift_algorithms::statistics::OVERLAY_ALPHA;
use geoshift_core::window::DEFAULT_OVERVIEW_TARGET;
use geoshift_core::{Error, Result};

/// Longest preview side in pixels
pub const DEFAULT_MAX_PREVIEW: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Longest side of generated previews
    pub max_preview_dimension: usize,
    /// Longest side of a synthesized window-reader overview
    pub overview_target: usize,
    pub low_percentile: f64,
    pub high_percentile: f64,
    /// Mean preview brightness below which gamma is applied
    pub dark_threshold: f64,
    pub gamma: f64,
    /// Alpha of changed pixels in change overlays
    pub overlay_alpha: u8,
    /// Layer opacity given to change overlays
    pub overlay_opacity: f32,
    /// Root of the per-session artifact directories
    pub cache_dir: PathBuf,
    /// Also write the change mask as a GeoTIFF after each analysis
    pub export_mask: bool,
    /// Register model placeholders next to the heuristic detectors
    pub model_hooks: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let stretch = StretchParams::default();
        Self {
            max_preview_dimension: DEFAULT_MAX_PREVIEW,
            overview_target: DEFAULT_OVERVIEW_TARGET,
            low_percentile: stretch.low_percentile,
            high_percentile: stretch.high_percentile,
            dark_threshold: stretch.dark_threshold,
            gamma: stretch.gamma,
            overlay_alpha: OVERLAY_ALPHA,
            overlay_opacity: 0.6,
            cache_dir: default_cache_dir(),
            export_mask: false,
            model_hooks: false,
        }
    }
}

impl SessionConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Other(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write this config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn stretch_params(&self) -> StretchParams {
        StretchParams {
            low_percentile: self.low_percentile,
            high_percentile: self.high_percentile,
            dark_threshold: self.dark_threshold,
            gamma: self.gamma,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_preview_dimension == 0 {
            return Err(Error::InvalidParameter {
                name: "max_preview_dimension",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.overlay_opacity) {
            return Err(Error::InvalidParameter {
                name: "overlay_opacity",
                value: self.overlay_opacity.to_string(),
                reason: "must be within 0..1".into(),
            });
        }
        if !(0.0..=100.0).contains(&self.low_percentile)
            || !(0.0..=100.0).contains(&self.high_percentile)
            || self.low_percentile >= self.high_percentile
        {
            return Err(Error::InvalidParameter {
                name: "percentiles",
                value: format!("{}..{}", self.low_percentile, self.high_percentile),
                reason: "need 0 <= low < high <= 100".into(),
            });
        }
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("geoshift")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_preview_dimension, 1024);
        assert_eq!(config.overview_target, 2048);
        assert_eq!(config.overlay_alpha, 180);
        assert_eq!(config.stretch_params(), StretchParams::default());
        assert!(config.cache_dir.ends_with("geoshift"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoshift.json");
        fs::write(&path, r#"{ "max_preview_dimension": 512, "gamma": 2.0 }"#).unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.max_preview_dimension, 512);
        assert_eq!(config.gamma, 2.0);
        assert_eq!(config.overview_target, 2048);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = SessionConfig {
            export_mask: true,
            cache_dir: dir.path().to_path_buf(),
            ..SessionConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "low_percentile": 90, "high_percentile": 10 }"#).unwrap();
        assert!(SessionConfig::load(&path).is_err());

        fs::write(&path, "not json").unwrap();
        assert!(SessionConfig::load(&path).is_err());
    }
}
