//! GeoTIFF key extraction from a `tiff` decoder.
//!
//! Reads tags 33550 (ModelPixelScale), 33922 (ModelTiepoint),
//! 34264 (ModelTransformation), 34735 (GeoKeyDirectory), 34737
//! (GeoAsciiParams) and 42113 (GDAL_NODATA) to produce a `GeoTransform`,
//! optional `CRS`, and optional nodata value.

use std::io::{Read, Seek};

use tiff::decoder::Decoder;
use tiff::tags::Tag;

use crate::crs::CRS;
use crate::raster::GeoTransform;

pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const MODEL_TRANSFORMATION: u16 = 34264;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GEO_ASCII_PARAMS: u16 = 34737;
pub(crate) const GDAL_NODATA: u16 = 42113;

pub(crate) const KEY_MODEL_TYPE: u32 = 1024;
pub(crate) const KEY_RASTER_TYPE: u32 = 1025;
pub(crate) const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
pub(crate) const KEY_PROJECTED_CS_TYPE: u32 = 3072;

/// GeoKey value meaning "user-defined", i.e. no EPSG code.
const USER_DEFINED: u32 = 32767;

/// Resolve a numeric tag code to the decoder's `Tag`.
///
/// Goes through `from_u16_exhaustive` so that codes the `tiff` crate knows by
/// name compare equal to the entries it parsed from the IFD.
pub(crate) fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// GeoTIFF metadata for the decoder's current image.
#[derive(Debug, Clone, Default)]
pub(crate) struct GeoKeys {
    pub transform: Option<GeoTransform>,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

pub(crate) fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> GeoKeys {
    GeoKeys {
        transform: read_transform(decoder),
        crs: read_crs(decoder),
        nodata: read_nodata(decoder),
    }
}

/// ModelPixelScale + ModelTiepoint, falling back to the 4x4
/// ModelTransformation matrix.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    let matrix = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)).ok()?;
    if matrix.len() < 16 {
        return None;
    }
    // Row-major 4x4; only the first two rows matter for a 2-D raster.
    Some(GeoTransform {
        origin_x: matrix[3],
        origin_y: matrix[7],
        pixel_width: matrix[0],
        pixel_height: matrix[5],
        row_rotation: matrix[1],
        col_rotation: matrix[4],
    })
}

/// EPSG code from ProjectedCSTypeGeoKey (3072) or GeographicTypeGeoKey (2048).
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let directory = decoder.get_tag_u32_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    let citation = decoder
        .get_tag_ascii_string(tag(GEO_ASCII_PARAMS))
        .ok()
        .map(|s| s.trim_end_matches(['|', '\0']).trim().to_string())
        .filter(|s| !s.is_empty());

    let epsg = epsg_from_directory(&directory);
    match (epsg, citation) {
        (Some(code), Some(c)) => Some(CRS::from_epsg(code).with_citation(c)),
        (Some(code), None) => Some(CRS::from_epsg(code)),
        (None, Some(c)) => Some(CRS::from_citation(c)),
        (None, None) => None,
    }
}

/// Walk a GeoKeyDirectory: `[version, revision, minor, count, (id, location, count, value)*]`.
///
/// Projected codes win over geographic ones; only keys stored inline
/// (location 0) carry a usable value.
pub(crate) fn epsg_from_directory(directory: &[u32]) -> Option<u32> {
    if directory.len() < 4 {
        return None;
    }
    let num_keys = directory[3] as usize;
    let mut geographic = None;
    let mut projected = None;

    for key in directory[4..].chunks_exact(4).take(num_keys) {
        let (id, location, value) = (key[0], key[1], key[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            KEY_PROJECTED_CS_TYPE => projected = Some(value),
            KEY_GEOGRAPHIC_TYPE => geographic = Some(value),
            _ => {}
        }
    }

    projected.or(geographic)
}

/// GDAL_NODATA is an ASCII float, sometimes NUL-terminated.
fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    parse_nodata(&text)
}

pub(crate) fn parse_nodata(text: &str) -> Option<f64> {
    let trimmed = text.trim_end_matches('\0').trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f64::NAN),
        _ => trimmed.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projected_code_preferred() {
        let dir = [
            1, 1, 0, 3, //
            1024, 0, 1, 1, //
            2048, 0, 1, 4326, //
            3072, 0, 1, 32630,
        ];
        assert_eq!(epsg_from_directory(&dir), Some(32630));
    }

    #[test]
    fn geographic_only() {
        let dir = [1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326];
        assert_eq!(epsg_from_directory(&dir), Some(4326));
    }

    #[test]
    fn user_defined_and_truncated_directories() {
        let dir = [1, 1, 0, 1, 3072, 0, 1, 32767];
        assert_eq!(epsg_from_directory(&dir), None);
        assert_eq!(epsg_from_directory(&[1, 1]), None);
        // Declared count larger than the payload stops at the last full key.
        let dir = [1, 1, 0, 5, 3072, 0, 1, 32721];
        assert_eq!(epsg_from_directory(&dir), Some(32721));
    }

    #[test]
    fn nodata_parsing() {
        assert_eq!(parse_nodata("-9999\0"), Some(-9999.0));
        assert_eq!(parse_nodata(" 0 "), Some(0.0));
        assert!(parse_nodata("nan").is_some_and(f64::is_nan));
        assert_eq!(parse_nodata("none"), None);
    }
}
