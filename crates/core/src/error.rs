//! Error types for GeoShift

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for GeoShift operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot load raster {}: {reason}", path.display())]
    RasterLoad { path: PathBuf, reason: String },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Image size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    DimensionMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unknown detector: {0}")]
    UnknownDetector(String),

    #[error("No model available for detector '{key}' (expected model file {model_file})")]
    ModelUnavailable { key: String, model_file: String },

    #[error("Reprojection from {from} failed: {reason}")]
    Reprojection { from: String, reason: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap any displayable failure as a [`Error::RasterLoad`] for `path`.
    pub fn raster_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::RasterLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`Error::DimensionMismatch`] from two `(rows, cols)` shapes.
    pub fn dimension_mismatch(expected: (usize, usize), actual: (usize, usize)) -> Self {
        Error::DimensionMismatch {
            er: expected.0,
            ec: expected.1,
            ar: actual.0,
            ac: actual.1,
        }
    }
}

/// Result type alias for GeoShift operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_load_message_names_path() {
        let err = Error::raster_load("/data/a.tif", "corrupt header");
        assert_eq!(err.to_string(), "Cannot load raster /data/a.tif: corrupt header");
    }

    #[test]
    fn dimension_mismatch_from_shapes() {
        let err = Error::dimension_mismatch((100, 100), (90, 90));
        assert!(matches!(
            err,
            Error::DimensionMismatch { er: 100, ec: 100, ar: 90, ac: 90 }
        ));
    }
}
