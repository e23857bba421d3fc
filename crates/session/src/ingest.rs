//! Raster ingestion: metadata, preview and display bounds
//!
//! Loading never decodes the full-resolution raster. Only the pixels that
//! land in the preview grid are read, one strip or tile at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tracing::{info, warn};

use geoshift_algorithms::imagery::{render_preview, StretchParams};
use geoshift_core::io::open_source;
use geoshift_core::reproject::bounds_to_wgs84;
use geoshift_core::{Bounds, Error, GeoTransform, RasterMetadata, Result, CRS};

use crate::artifacts::{ArtifactHandle, ArtifactKind, ArtifactStore};
use crate::config::SessionConfig;

/// A loaded raster: geometry, metadata and its preview.
///
/// Immutable once created and shared behind an `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct RasterHandle {
    pub path: PathBuf,
    pub metadata: RasterMetadata,
    /// Bounds in the raster's own CRS
    pub bounds: Bounds,
    /// Bounds in WGS84 longitude/latitude, when reprojection succeeded
    pub display_bounds: Option<Bounds>,
    pub preview: ArtifactHandle,
    /// Preview size as (width, height)
    pub preview_size: (usize, usize),
}

impl RasterHandle {
    /// File name without directories.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn width(&self) -> usize {
        self.metadata.width
    }

    pub fn height(&self) -> usize {
        self.metadata.height
    }

    pub fn band_count(&self) -> usize {
        self.metadata.band_count
    }

    pub fn transform(&self) -> GeoTransform {
        self.metadata.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.metadata.crs.as_ref()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.metadata.nodata
    }

    /// Bounds a layer should be drawn at: WGS84 if reprojected, else native.
    pub fn layer_bounds(&self) -> Bounds {
        self.display_bounds.unwrap_or(self.bounds)
    }
}

/// Preview size `(width, height)` for a raster under `max_dimension`.
///
/// The decimation factor is `max(1, longest / max_dimension)` and each side
/// is floored, never below one pixel.
pub fn preview_size(width: usize, height: usize, max_dimension: usize) -> (usize, usize) {
    let longest = width.max(height) as f64;
    let factor = (longest / max_dimension.max(1) as f64).max(1.0);
    let w = ((width as f64 / factor).floor() as usize).max(1);
    let h = ((height as f64 / factor).floor() as usize).max(1);
    (w, h)
}

pub struct RasterIngestor {
    store: Arc<ArtifactStore>,
    params: StretchParams,
    max_preview_dimension: usize,
}

impl RasterIngestor {
    pub fn new(store: Arc<ArtifactStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            params: config.stretch_params(),
            max_preview_dimension: config.max_preview_dimension,
        }
    }

    /// Load with the configured preview cap.
    pub fn ingest(&self, path: &Path) -> Result<Arc<RasterHandle>> {
        self.load(path, self.max_preview_dimension)
    }

    /// Open `path`, build a preview no larger than `max_preview_dimension`
    /// on its longest side and work out display bounds.
    pub fn load(&self, path: &Path, max_preview_dimension: usize) -> Result<Arc<RasterHandle>> {
        let mut source = open_source(path).map_err(|e| match e {
            Error::RasterLoad { .. } => e,
            other => Error::raster_load(path, other),
        })?;
        let metadata = source.metadata().clone();
        if metadata.width == 0 || metadata.height == 0 || metadata.band_count == 0 {
            return Err(Error::raster_load(path, "raster has no pixels"));
        }

        let (out_w, out_h) = preview_size(metadata.width, metadata.height, max_preview_dimension);
        let bands: Vec<usize> = (0..metadata.display_band_count()).collect();
        let block = source
            .read_decimated(out_h, out_w, &bands)
            .map_err(|e| Error::raster_load(path, e))?;
        drop(source);

        let rgba = render_preview(&block, metadata.nodata, &self.params)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let preview = self.store.write_rgba_png(
            ArtifactKind::Preview,
            &stem,
            content_key(path, max_preview_dimension).as_bytes(),
            &rgba,
        )?;

        let bounds = metadata.bounds();
        let display_bounds = match &metadata.crs {
            Some(crs) if !crs.is_wgs84() => match bounds_to_wgs84(&bounds, crs) {
                Ok(b) => Some(b),
                Err(e) => {
                    warn!("{}; using native bounds for {}", e, path.display());
                    None
                }
            },
            _ => None,
        };

        info!(
            "Loaded {} ({}x{}, {} band(s), {}, preview {}x{})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.band_count,
            metadata.sample_type,
            out_w,
            out_h
        );

        Ok(Arc::new(RasterHandle {
            path: path.to_path_buf(),
            metadata,
            bounds,
            display_bounds,
            preview,
            preview_size: (out_w, out_h),
        }))
    }
}

/// Path, size and modification time: changes whenever the file does.
fn content_key(path: &Path, max_preview_dimension: usize) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let (len, modified) = std::fs::metadata(path)
        .map(|m| {
            let modified = m
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            (m.len(), modified)
        })
        .unwrap_or((0, 0));
    format!("{}|{}|{}|{}", canonical.display(), len, modified, max_preview_dimension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_size_caps_longest_side() {
        assert_eq!(preview_size(4000, 3000, 1024), (1024, 768));
        assert_eq!(preview_size(3000, 4000, 1024), (768, 1024));
        assert_eq!(preview_size(500, 200, 1024), (500, 200));
        assert_eq!(preview_size(10_000, 3, 1024), (1024, 1));
    }

    #[test]
    fn preview_size_floors_fractional_factors() {
        // factor 1500 / 1024 = 1.4648...
        assert_eq!(preview_size(1500, 1000, 1024), (1024, 682));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(root.path()).unwrap());
        let ingestor = RasterIngestor::new(store, &SessionConfig::default());
        let err = ingestor.ingest(Path::new("/no/such/raster.tif")).unwrap_err();
        assert!(matches!(err, Error::RasterLoad { .. }));
    }
}
