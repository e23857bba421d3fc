//! GeoTIFF round trips through the native writer, chunked reader and
//! `WindowedReader`.

use std::path::{Path, PathBuf};

use geoshift_core::io::{
    open_source, write_geotiff_f32, write_geotiff_u16, write_geotiff_u8, write_mask_geotiff,
    GeoTiffOptions, RasterSource, TiffSource, Window,
};
use geoshift_core::{GeoTransform, SampleType, WindowedReader, CRS};
use ndarray::{Array2, Array3};

fn utm_options() -> GeoTiffOptions {
    GeoTiffOptions {
        transform: GeoTransform::new(440_000.0, 4_480_000.0, 10.0, -10.0),
        crs: Some(CRS::from_epsg(32630)),
        nodata: None,
        rows_per_strip: Some(7),
        overview_factors: Vec::new(),
    }
}

/// 4-band 8-bit image where band b at (r, c) holds (r + c + 50 * b) % 256.
fn four_band(rows: usize, cols: usize) -> Array3<u8> {
    Array3::from_shape_fn((rows, cols, 4), |(r, c, b)| ((r + c + 50 * b) % 256) as u8)
}

fn write_four_band(dir: &Path, options: &GeoTiffOptions) -> PathBuf {
    let path = dir.join("scene.tif");
    write_geotiff_u8(&path, &four_band(40, 60), options).unwrap();
    path
}

#[test]
fn metadata_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = utm_options();
    options.nodata = Some(0.0);
    let path = write_four_band(dir.path(), &options);

    let src = TiffSource::open(&path).unwrap();
    let meta = src.metadata();
    assert_eq!((meta.width, meta.height, meta.band_count), (60, 40, 4));
    assert_eq!(meta.sample_type, SampleType::U8);
    assert_eq!(meta.transform, options.transform);
    assert_eq!(meta.crs.as_ref().and_then(CRS::epsg), Some(32630));
    assert_eq!(meta.nodata, Some(0.0));
    assert!(meta.overviews.is_empty());

    let b = meta.bounds();
    assert_eq!((b.left, b.top), (440_000.0, 4_480_000.0));
    assert_eq!((b.right, b.bottom), (440_600.0, 4_479_600.0));
}

#[test]
fn window_spans_strips_and_selects_bands() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_four_band(dir.path(), &utm_options());
    let mut src = TiffSource::open(&path).unwrap();

    // Rows 5..17 cross three 7-row strips.
    let block = src.read_window(Window::new(5, 10, 12, 8), &[2, 0]).unwrap();
    assert_eq!(block.dim(), (12, 8, 2));
    for r in 0..12 {
        for c in 0..8 {
            let (sr, sc) = (r + 5, c + 10);
            assert_eq!(block[[r, c, 0]], ((sr + sc + 100) % 256) as f64);
            assert_eq!(block[[r, c, 1]], ((sr + sc) % 256) as f64);
        }
    }

    assert!(src.read_window(Window::new(35, 0, 10, 5), &[0]).is_err());
    assert!(src.read_window(Window::new(0, 0, 2, 2), &[4]).is_err());
}

#[test]
fn decimated_read_samples_cell_centers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_four_band(dir.path(), &utm_options());
    let mut src = TiffSource::open(&path).unwrap();

    let small = src.read_decimated(10, 15, &[0]).unwrap();
    assert_eq!(small.dim(), (10, 15, 1));
    // factor 4: output (r, c) samples source (4r + 2, 4c + 2)
    assert_eq!(small[[0, 0, 0]], 4.0);
    assert_eq!(small[[9, 14, 0]], (38 + 58) as f64);
}

#[test]
fn sixteen_bit_and_float_sources() {
    let dir = tempfile::tempdir().unwrap();

    let u16_path = dir.path().join("dem16.tif");
    let data = Array2::from_shape_fn((20, 30), |(r, c)| (r * 1000 + c) as u16);
    write_geotiff_u16(&u16_path, &data, &utm_options()).unwrap();
    let mut src = open_source(&u16_path).unwrap();
    assert_eq!(src.metadata().sample_type, SampleType::U16);
    let block = src.read_window(Window::new(19, 29, 1, 1), &[0]).unwrap();
    assert_eq!(block[[0, 0, 0]], 19_029.0);

    let f32_path = dir.path().join("ndwi.tif");
    let data = Array2::from_shape_fn((8, 8), |(r, c)| r as f32 * 0.25 - c as f32);
    write_geotiff_f32(&f32_path, &data, &GeoTiffOptions::default()).unwrap();
    let mut src = open_source(&f32_path).unwrap();
    assert_eq!(src.metadata().sample_type, SampleType::F32);
    assert!(src.metadata().crs.is_none());
    let block = src.read_window(Window::new(3, 2, 1, 1), &[0]).unwrap();
    assert_eq!(block[[0, 0, 0]], 0.75 - 2.0);
}

#[test]
fn mask_geotiff_is_georeferenced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mask.tif");
    let mask = Array2::from_shape_fn((10, 10), |(r, _)| if r < 5 { 255u8 } else { 0 });
    write_mask_geotiff(&path, &mask, GeoTransform::new(0.0, 100.0, 10.0, -10.0), Some(CRS::wgs84())).unwrap();

    let mut src = TiffSource::open(&path).unwrap();
    assert_eq!(src.metadata().band_count, 1);
    assert_eq!(src.metadata().crs.as_ref().and_then(CRS::epsg), Some(4326));
    let block = src.read_window(Window::full(10, 10), &[0]).unwrap();
    assert_eq!(block.iter().filter(|&&v| v == 255.0).count(), 50);
}

#[test]
fn builtin_overview_is_preferred() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = utm_options();
    options.overview_factors = vec![2, 4];
    let path = write_four_band(dir.path(), &options);

    let src = TiffSource::open(&path).unwrap();
    assert_eq!(src.metadata().overviews, vec![(30, 20), (15, 10)]);
    drop(src);

    let mut reader = WindowedReader::new();
    reader.open(&path).unwrap();
    let overview = reader.overview().unwrap();
    // Smallest level, first three bands only
    assert_eq!(overview.dim(), (10, 15, 3));
    assert_eq!(overview[[1, 1, 0]], 8.0);
    assert_eq!(overview[[1, 1, 1]], 58.0);
}

#[test]
fn synthesized_overview_targets_longest_side() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_four_band(dir.path(), &utm_options());

    let mut reader = WindowedReader::with_overview_target(16);
    reader.open(&path).unwrap();
    // factor = 60 / 16 = 3 → 13 x 20
    assert_eq!(reader.overview().unwrap().dim(), (13, 20, 3));
}

#[test]
fn windowed_reader_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_four_band(dir.path(), &utm_options());
    let second = dir.path().join("gray.tif");
    write_geotiff_u8(&second, &Array3::from_elem((5, 6, 1), 9u8), &GeoTiffOptions::default()).unwrap();

    let mut reader = WindowedReader::new();
    assert!(reader.read_window(0, 0, 1, 1).is_none());

    reader.open(&first).unwrap();
    let block = reader.read_window(10, 20, 4, 4).unwrap();
    assert_eq!(block.dim(), (4, 4, 3));
    assert!(reader.read_window(38, 0, 4, 4).is_none());
    assert!(reader.read_window(0, 0, 0, 4).is_none());

    // Reopening switches sources without an explicit close.
    reader.open(&second).unwrap();
    assert_eq!(reader.path(), Some(second.as_path()));
    let block = reader.read_window(0, 0, 5, 6).unwrap();
    assert_eq!(block.dim(), (5, 6, 1));
    assert!(block.iter().all(|&v| v == 9.0));

    reader.close();
    reader.close();
    assert!(!reader.is_open());
    assert!(reader.overview().is_none());
    assert!(reader.read_window(0, 0, 1, 1).is_none());

    reader.open(&first).unwrap();
    assert_eq!(reader.read_full().unwrap().dim(), (40, 60, 3));
}

#[test]
fn failed_open_leaves_reader_closed() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_four_band(dir.path(), &utm_options());
    let bad = dir.path().join("broken.tif");
    std::fs::write(&bad, b"II*\0not really a tiff").unwrap();

    let mut reader = WindowedReader::new();
    reader.open(&good).unwrap();
    assert!(reader.open(&bad).is_err());
    assert!(!reader.is_open());
}
