//! Raster readers and writers
//!
//! GeoTIFFs are read chunk by chunk through the `tiff` crate; other image
//! formats fall back to the `image` crate.

mod geokeys;
mod geotiff;
mod image_source;
mod source;
mod writer;

pub use geotiff::TiffSource;
pub use image_source::ImageSource;
pub use source::{open_source, RasterSource, Window};
pub use writer::{
    write_geotiff_f32, write_geotiff_u16, write_geotiff_u8, write_mask_geotiff, GeoTiffOptions,
};
