//! Header-level description of a raster source

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Bounds, GeoTransform};
use crate::crs::CRS;

/// Storage type of a raster's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl SampleType {
    /// True when samples already live in the 0..=255 display range.
    pub fn is_byte(&self) -> bool {
        matches!(self, SampleType::U8)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleType::F32 | SampleType::F64)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "uint8",
            SampleType::U16 => "uint16",
            SampleType::U32 => "uint32",
            SampleType::U64 => "uint64",
            SampleType::I8 => "int8",
            SampleType::I16 => "int16",
            SampleType::I32 => "int32",
            SampleType::I64 => "int64",
            SampleType::F32 => "float32",
            SampleType::F64 => "float64",
        };
        f.write_str(name)
    }
}

/// Everything known about a raster without decoding its pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub sample_type: SampleType,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
    /// Sizes `(width, height)` of built-in reduced-resolution images, if any.
    pub overviews: Vec<(usize, usize)>,
}

impl RasterMetadata {
    /// Native bounds derived from the transform.
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width, self.height)
    }

    /// `(rows, cols)`, matching ndarray's shape order.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of bands shown on screen: the first three of a multiband
    /// raster, otherwise all of them.
    pub fn display_band_count(&self) -> usize {
        self.band_count.min(3)
    }

    pub fn is_georeferenced(&self) -> bool {
        self.crs.is_some() || self.transform != GeoTransform::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(bands: usize) -> RasterMetadata {
        RasterMetadata {
            width: 30,
            height: 20,
            band_count: bands,
            sample_type: SampleType::U16,
            transform: GeoTransform::new(500.0, 1000.0, 2.0, -2.0),
            crs: Some(CRS::from_epsg(32630)),
            nodata: None,
            overviews: Vec::new(),
        }
    }

    #[test]
    fn display_bands_cap_at_three() {
        assert_eq!(meta(1).display_band_count(), 1);
        assert_eq!(meta(3).display_band_count(), 3);
        assert_eq!(meta(8).display_band_count(), 3);
    }

    #[test]
    fn bounds_follow_transform() {
        let m = meta(3);
        assert_eq!(m.shape(), (20, 30));
        assert_eq!(m.bounds(), Bounds::new(500.0, 960.0, 560.0, 1000.0));
        assert!(m.is_georeferenced());
    }

    #[test]
    fn sample_type_names() {
        assert_eq!(SampleType::F32.to_string(), "float32");
        assert!(SampleType::U8.is_byte());
        assert!(!SampleType::U16.is_byte());
    }
}
