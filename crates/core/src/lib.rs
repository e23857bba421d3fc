//! # GeoShift Core
//!
//! Core types and I/O for the GeoShift raster comparison engine.
//!
//! This crate provides:
//! - `GeoTransform`, `Bounds` and `RasterMetadata`: raster geometry
//! - `CRS`: Coordinate Reference System handling
//! - `RasterSource`: chunked GeoTIFF and plain-image readers
//! - `WindowedReader`: random-access window reads with a fast overview
//! - Bounding-box reprojection to WGS84 for display
//! - The `Algorithm` trait shared by image algorithms

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod reproject;
pub mod window;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{Bounds, GeoTransform, PixelBlock, RasterMetadata, SampleType};
pub use window::WindowedReader;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{open_source, RasterSource, Window};
    pub use crate::raster::{Bounds, GeoTransform, PixelBlock, RasterMetadata};
    pub use crate::window::WindowedReader;
    pub use crate::Algorithm;
}

/// Core trait for image algorithms.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
