//! Format-independent access to raster pixels

use std::path::Path;

use tracing::debug;

use super::geotiff::TiffSource;
use super::image_source::ImageSource;
use crate::error::{Error, Result};
use crate::raster::{PixelBlock, RasterMetadata};

/// A rectangular region of the full-resolution pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row_off: usize,
    pub col_off: usize,
    pub height: usize,
    pub width: usize,
}

impl Window {
    pub fn new(row_off: usize, col_off: usize, height: usize, width: usize) -> Self {
        Self {
            row_off,
            col_off,
            height,
            width,
        }
    }

    /// Window covering a whole `rows` x `cols` grid.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, rows, cols)
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// True if the window lies entirely inside a `rows` x `cols` grid.
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        self.row_off
            .checked_add(self.height)
            .is_some_and(|end| end <= rows)
            && self
                .col_off
                .checked_add(self.width)
                .is_some_and(|end| end <= cols)
    }
}

/// Random access to a raster's pixels.
///
/// Implementations decode only what a request needs where the format allows
/// it. All reads return `(rows, cols, bands)` blocks for the requested band
/// indices, in the order given.
pub trait RasterSource: Send {
    /// Header information, available without decoding pixels
    fn metadata(&self) -> &RasterMetadata;

    /// Read a full-resolution window.
    fn read_window(&mut self, window: Window, bands: &[usize]) -> Result<PixelBlock>;

    /// Nearest-neighbour read of the whole raster at `out_rows` x `out_cols`.
    fn read_decimated(&mut self, out_rows: usize, out_cols: usize, bands: &[usize]) -> Result<PixelBlock>;

    /// Read a built-in reduced-resolution level in full.
    ///
    /// `level` indexes [`RasterMetadata::overviews`].
    fn read_overview(&mut self, level: usize, bands: &[usize]) -> Result<PixelBlock>;
}

/// Open `path` with the most capable reader for it.
///
/// TIFF files go through the chunked GeoTIFF reader; anything it rejects,
/// and every other extension, is handed to the `image` crate.
pub fn open_source(path: &Path) -> Result<Box<dyn RasterSource>> {
    if !path.exists() {
        return Err(Error::raster_load(path, "file not found"));
    }

    let is_tiff = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "tif" | "tiff" | "gtiff"))
        .unwrap_or(false);

    if is_tiff {
        match TiffSource::open(path) {
            Ok(source) => return Ok(Box::new(source)),
            Err(e) => {
                debug!("GeoTIFF reader rejected {}: {}, trying image decoder", path.display(), e);
                return ImageSource::open(path)
                    .map(|s| Box::new(s) as Box<dyn RasterSource>)
                    .map_err(|_| Error::raster_load(path, e));
            }
        }
    }

    Ok(Box::new(ImageSource::open(path)?))
}

/// Source rows/cols sampled by a nearest-neighbour decimation to `out` cells.
///
/// Each output cell takes the source cell under its center.
pub(crate) fn decimation_indices(src: usize, out: usize) -> Vec<usize> {
    let scale = src as f64 / out as f64;
    (0..out)
        .map(|i| (((i as f64 + 0.5) * scale).floor() as usize).min(src.saturating_sub(1)))
        .collect()
}

/// Check a band list against the source's band count.
pub(crate) fn validate_bands(bands: &[usize], band_count: usize) -> Result<()> {
    if bands.is_empty() {
        return Err(Error::InvalidParameter {
            name: "bands",
            value: "[]".into(),
            reason: "at least one band is required".into(),
        });
    }
    if let Some(&bad) = bands.iter().find(|&&b| b >= band_count) {
        return Err(Error::InvalidParameter {
            name: "bands",
            value: bad.to_string(),
            reason: format!("raster has {} band(s)", band_count),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_picks_cell_centers() {
        assert_eq!(decimation_indices(10, 5), vec![1, 3, 5, 7, 9]);
        assert_eq!(decimation_indices(4, 4), vec![0, 1, 2, 3]);
        assert_eq!(decimation_indices(5, 1), vec![2]);
    }

    #[test]
    fn window_fit() {
        assert!(Window::new(0, 0, 10, 10).fits(10, 10));
        assert!(!Window::new(5, 0, 6, 10).fits(10, 10));
        assert!(!Window::new(usize::MAX, 0, 2, 1).fits(10, 10));
        assert!(Window::new(3, 3, 0, 4).is_empty());
    }

    #[test]
    fn band_validation() {
        assert!(validate_bands(&[0, 1, 2], 3).is_ok());
        assert!(validate_bands(&[3], 3).is_err());
        assert!(validate_bands(&[], 3).is_err());
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = open_source(Path::new("/definitely/not/here.tif"))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("file not found"), "{err}");
    }
}
