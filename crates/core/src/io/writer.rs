//! GeoTIFF writer
//!
//! Writes strip-organised, uncompressed GeoTIFFs with pixel scale, tiepoint,
//! GeoKeyDirectory and GDAL_NODATA tags. Optional reduced-resolution copies
//! are appended as extra IFDs (NewSubfileType = 1), which the reader exposes
//! as overviews.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use ndarray::{s, Array2, Array3, ArrayView3};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

use super::geokeys::{
    tag, GDAL_NODATA, GEO_KEY_DIRECTORY, KEY_GEOGRAPHIC_TYPE, KEY_MODEL_TYPE, KEY_PROJECTED_CS_TYPE,
    KEY_RASTER_TYPE, MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION,
};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Georeferencing and layout options for written GeoTIFFs
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
    /// Rows per strip; `None` lets the encoder choose
    pub rows_per_strip: Option<u32>,
    /// Decimation factors of overview IFDs to append, e.g. `[2, 4]`
    pub overview_factors: Vec<usize>,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
            rows_per_strip: None,
            overview_factors: Vec::new(),
        }
    }
}

impl GeoTiffOptions {
    pub fn georeferenced(transform: GeoTransform, crs: Option<CRS>) -> Self {
        Self {
            transform,
            crs,
            ..Self::default()
        }
    }
}

/// Write an 8-bit image of 1, 3 or 4 bands, shaped `(rows, cols, bands)`.
pub fn write_geotiff_u8(path: &Path, data: &Array3<u8>, options: &GeoTiffOptions) -> Result<()> {
    let mut encoder = create(path)?;
    match data.dim().2 {
        1 => write_levels::<colortype::Gray8, _>(&mut encoder, data.view(), options),
        3 => write_levels::<colortype::RGB8, _>(&mut encoder, data.view(), options),
        4 => write_levels::<colortype::RGBA8, _>(&mut encoder, data.view(), options),
        n => Err(Error::UnsupportedDataType(format!("cannot write {} 8-bit bands", n))),
    }
}

/// Write a single-band 16-bit raster.
pub fn write_geotiff_u16(path: &Path, data: &Array2<u16>, options: &GeoTiffOptions) -> Result<()> {
    let mut encoder = create(path)?;
    let cube = data.view().insert_axis(ndarray::Axis(2));
    write_levels::<colortype::Gray16, _>(&mut encoder, cube, options)
}

/// Write a single-band 32-bit float raster.
pub fn write_geotiff_f32(path: &Path, data: &Array2<f32>, options: &GeoTiffOptions) -> Result<()> {
    let mut encoder = create(path)?;
    let cube = data.view().insert_axis(ndarray::Axis(2));
    write_levels::<colortype::Gray32Float, _>(&mut encoder, cube, options)
}

/// Write a binary change mask as a georeferenced 8-bit GeoTIFF.
pub fn write_mask_geotiff(
    path: &Path,
    mask: &Array2<u8>,
    transform: GeoTransform,
    crs: Option<CRS>,
) -> Result<()> {
    let cube = mask.clone().insert_axis(ndarray::Axis(2));
    write_geotiff_u8(path, &cube, &GeoTiffOptions::georeferenced(transform, crs))
}

fn create(path: &Path) -> Result<TiffEncoder<BufWriter<File>>> {
    let file = File::create(path)?;
    Ok(TiffEncoder::new(BufWriter::new(file))?)
}

/// Full-resolution image followed by one IFD per overview factor.
fn write_levels<C, W>(
    encoder: &mut TiffEncoder<W>,
    data: ArrayView3<'_, C::Inner>,
    options: &GeoTiffOptions,
) -> Result<()>
where
    C: ColorType,
    C::Inner: Copy,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    write_level::<C, W>(encoder, data, options, true)?;

    for &factor in &options.overview_factors {
        if factor < 2 {
            continue;
        }
        let step = factor as isize;
        let reduced = data.slice(s![..;step, ..;step, ..]);
        write_level::<C, W>(encoder, reduced, options, false)?;
    }
    Ok(())
}

fn write_level<C, W>(
    encoder: &mut TiffEncoder<W>,
    data: ArrayView3<'_, C::Inner>,
    options: &GeoTiffOptions,
    full_resolution: bool,
) -> Result<()>
where
    C: ColorType,
    C::Inner: Copy,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let (rows, cols, _) = data.dim();
    let samples: Vec<C::Inner> = data.iter().copied().collect();

    let mut image = encoder.new_image::<C>(cols as u32, rows as u32)?;
    if let Some(n) = options.rows_per_strip {
        image.rows_per_strip(n)?;
    }

    if full_resolution {
        let gt = &options.transform;
        if gt.row_rotation == 0.0 && gt.col_rotation == 0.0 {
            let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
            image.encoder().write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
            let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
            image.encoder().write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
        } else {
            let matrix = [
                gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x, //
                gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ];
            image.encoder().write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])?;
        }

        let geokeys = geokey_directory(options.crs.as_ref());
        image.encoder().write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])?;

        if let Some(nodata) = options.nodata {
            let text = format_nodata(nodata);
            image.encoder().write_tag(tag(GDAL_NODATA), text.as_str())?;
        }
    } else {
        image.encoder().write_tag(Tag::NewSubfileType, 1u32)?;
    }

    image.write_data(&samples)?;
    Ok(())
}

/// GeoKeyDirectory with model type, raster type and, if known, the EPSG code.
/// Keys are emitted in ascending id order as the format requires.
fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok());
    let geographic = epsg.is_some_and(|c| (4000..5000).contains(&c));
    let model_type = if geographic { 2 } else { 1 };

    let mut keys: Vec<[u16; 4]> = vec![
        [KEY_MODEL_TYPE as u16, 0, 1, model_type],
        [KEY_RASTER_TYPE as u16, 0, 1, 1],
    ];
    match epsg {
        Some(code) if geographic => keys.push([KEY_GEOGRAPHIC_TYPE as u16, 0, 1, code]),
        Some(code) => keys.push([KEY_PROJECTED_CS_TYPE as u16, 0, 1, code]),
        None => {}
    }

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    directory.extend(keys.into_iter().flatten());
    directory
}

fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", nodata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::geokeys::epsg_from_directory;

    #[test]
    fn geokeys_for_projected_and_geographic() {
        let projected = geokey_directory(Some(&CRS::from_epsg(32630)));
        assert_eq!(projected[3], 3);
        let as_u32: Vec<u32> = projected.iter().map(|&v| v as u32).collect();
        assert_eq!(epsg_from_directory(&as_u32), Some(32630));

        let geographic = geokey_directory(Some(&CRS::wgs84()));
        assert_eq!(&geographic[4..8], &[1024, 0, 1, 2]);
        assert_eq!(&geographic[12..16], &[2048, 0, 1, 4326]);

        let bare = geokey_directory(None);
        assert_eq!(bare, vec![1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1]);
    }

    #[test]
    fn nodata_text() {
        assert_eq!(format_nodata(-9999.0), "-9999");
        assert_eq!(format_nodata(0.5), "0.5");
        assert_eq!(format_nodata(f64::NAN), "nan");
    }
}
