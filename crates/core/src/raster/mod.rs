//! Raster geometry and metadata

mod bounds;
mod geotransform;
mod metadata;

pub use bounds::Bounds;
pub use geotransform::GeoTransform;
pub use metadata::{RasterMetadata, SampleType};

/// Pixel block in (row, col, band) order, samples widened to `f64`.
pub type PixelBlock = ndarray::Array3<f64>;
