//! Fallback reader for plain images (PNG, JPEG, BMP, WebP, ...)
//!
//! These formats have no random access, so the image is decoded once on
//! open and served from memory. They carry no georeferencing and get the
//! pixel-space identity transform.

use std::path::Path;

use image::DynamicImage;
use ndarray::{Array3, Axis};

use super::source::{decimation_indices, validate_bands, RasterSource, Window};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, PixelBlock, RasterMetadata, SampleType};

pub struct ImageSource {
    meta: RasterMetadata,
    pixels: Array3<f64>,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| Error::raster_load(path, e))?;
        let (width, height) = (img.width() as usize, img.height() as usize);

        let (band_count, sample_type, samples) = flatten(img);
        let pixels = Array3::from_shape_vec((height, width, band_count), samples)
            .map_err(|e| Error::raster_load(path, e))?;

        let meta = RasterMetadata {
            width,
            height,
            band_count,
            sample_type,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
            overviews: Vec::new(),
        };
        Ok(Self { meta, pixels })
    }
}

/// Interleaved samples of `img` at its native depth.
fn flatten(img: DynamicImage) -> (usize, SampleType, Vec<f64>) {
    fn widen<T: Into<f64> + Copy>(raw: Vec<T>) -> Vec<f64> {
        raw.into_iter().map(Into::into).collect()
    }

    match img {
        DynamicImage::ImageLuma8(b) => (1, SampleType::U8, widen(b.into_raw())),
        DynamicImage::ImageLumaA8(b) => (2, SampleType::U8, widen(b.into_raw())),
        DynamicImage::ImageRgb8(b) => (3, SampleType::U8, widen(b.into_raw())),
        DynamicImage::ImageRgba8(b) => (4, SampleType::U8, widen(b.into_raw())),
        DynamicImage::ImageLuma16(b) => (1, SampleType::U16, widen(b.into_raw())),
        DynamicImage::ImageLumaA16(b) => (2, SampleType::U16, widen(b.into_raw())),
        DynamicImage::ImageRgb16(b) => (3, SampleType::U16, widen(b.into_raw())),
        DynamicImage::ImageRgba16(b) => (4, SampleType::U16, widen(b.into_raw())),
        DynamicImage::ImageRgb32F(b) => (3, SampleType::F32, widen(b.into_raw())),
        DynamicImage::ImageRgba32F(b) => (4, SampleType::F32, widen(b.into_raw())),
        other => (4, SampleType::U8, widen(other.into_rgba8().into_raw())),
    }
}

impl RasterSource for ImageSource {
    fn metadata(&self) -> &RasterMetadata {
        &self.meta
    }

    fn read_window(&mut self, window: Window, bands: &[usize]) -> Result<PixelBlock> {
        validate_bands(bands, self.meta.band_count)?;
        if window.is_empty() || !window.fits(self.meta.height, self.meta.width) {
            return Err(Error::InvalidParameter {
                name: "window",
                value: format!("{:?}", window),
                reason: format!("outside {}x{} image", self.meta.width, self.meta.height),
            });
        }
        let rows: Vec<usize> = (window.row_off..window.row_off + window.height).collect();
        let cols: Vec<usize> = (window.col_off..window.col_off + window.width).collect();
        Ok(self.gather(&rows, &cols, bands))
    }

    fn read_decimated(&mut self, out_rows: usize, out_cols: usize, bands: &[usize]) -> Result<PixelBlock> {
        validate_bands(bands, self.meta.band_count)?;
        if out_rows == 0 || out_cols == 0 {
            return Err(Error::InvalidDimensions {
                width: out_cols,
                height: out_rows,
            });
        }
        let rows = decimation_indices(self.meta.height, out_rows);
        let cols = decimation_indices(self.meta.width, out_cols);
        Ok(self.gather(&rows, &cols, bands))
    }

    fn read_overview(&mut self, level: usize, _bands: &[usize]) -> Result<PixelBlock> {
        Err(Error::InvalidParameter {
            name: "level",
            value: level.to_string(),
            reason: "plain images have no overviews".into(),
        })
    }
}

impl ImageSource {
    fn gather(&self, rows: &[usize], cols: &[usize], bands: &[usize]) -> PixelBlock {
        self.pixels
            .select(Axis(0), rows)
            .select(Axis(1), cols)
            .select(Axis(2), bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient_png(dir: &Path) -> std::path::PathBuf {
        let img = RgbImage::from_fn(8, 4, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 7]));
        let path = dir.join("gradient.png");
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn png_is_read_in_pixel_space() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = ImageSource::open(&gradient_png(dir.path())).unwrap();

        let meta = src.metadata().clone();
        assert_eq!((meta.width, meta.height, meta.band_count), (8, 4, 3));
        assert!(meta.crs.is_none());
        assert!(!meta.is_georeferenced());

        let block = src.read_window(Window::new(1, 2, 2, 3), &[0, 1]).unwrap();
        assert_eq!(block.dim(), (2, 3, 2));
        assert_eq!(block[[0, 0, 0]], 20.0);
        assert_eq!(block[[1, 2, 1]], 40.0);
    }

    #[test]
    fn decimated_and_bad_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = ImageSource::open(&gradient_png(dir.path())).unwrap();

        let small = src.read_decimated(2, 4, &[2]).unwrap();
        assert_eq!(small.dim(), (2, 4, 1));
        assert!(small.iter().all(|&v| v == 7.0));

        assert!(src.read_window(Window::new(3, 0, 2, 1), &[0]).is_err());
        assert!(src.read_overview(0, &[0]).is_err());
    }
}
