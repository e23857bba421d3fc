//! Chunked GeoTIFF reader
//!
//! Decodes one strip or tile at a time so windowed and decimated reads never
//! hold the full-resolution image. Reduced-resolution images stored as extra
//! IFDs are exposed as overviews.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use num_traits::ToPrimitive;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::{SampleFormat, Tag};
use tracing::debug;

use super::geokeys::read_geokeys;
use super::source::{decimation_indices, validate_bands, RasterSource, Window};
use crate::error::{Error, Result};
use crate::raster::{PixelBlock, RasterMetadata, SampleType};

type FileDecoder = Decoder<BufReader<File>>;

/// GeoTIFF file opened for random access.
pub struct TiffSource {
    path: PathBuf,
    decoder: FileDecoder,
    meta: RasterMetadata,
    /// IFD index of each overview, parallel to `meta.overviews`
    overview_ifds: Vec<usize>,
}

impl TiffSource {
    /// Open a GeoTIFF and read its header and geokeys.
    pub fn open(path: &Path) -> Result<Self> {
        let mut decoder = open_decoder(path)?;

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| Error::raster_load(path, format!("cannot read dimensions: {}", e)))?;
        let band_count = samples_per_pixel(&mut decoder);
        check_chunky(&mut decoder).map_err(|e| Error::raster_load(path, e))?;
        let sample_type = sample_type(&mut decoder).map_err(|e| Error::raster_load(path, e))?;
        let keys = read_geokeys(&mut decoder);

        let (overviews, overview_ifds) = scan_overviews(path, (width, height), band_count)?;

        let meta = RasterMetadata {
            width: width as usize,
            height: height as usize,
            band_count,
            sample_type,
            transform: keys.transform.unwrap_or_default(),
            crs: keys.crs,
            nodata: keys.nodata,
            overviews,
        };

        debug!(
            "Opened {}: {}x{}, {} band(s) of {}, {} overview(s)",
            path.display(),
            meta.width,
            meta.height,
            meta.band_count,
            meta.sample_type,
            meta.overviews.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            meta,
            overview_ifds,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for TiffSource {
    fn metadata(&self) -> &RasterMetadata {
        &self.meta
    }

    fn read_window(&mut self, window: Window, bands: &[usize]) -> Result<PixelBlock> {
        validate_bands(bands, self.meta.band_count)?;
        if window.is_empty() || !window.fits(self.meta.height, self.meta.width) {
            return Err(Error::InvalidParameter {
                name: "window",
                value: format!("{:?}", window),
                reason: format!("outside {}x{} raster", self.meta.width, self.meta.height),
            });
        }
        let rows: Vec<usize> = (window.row_off..window.row_off + window.height).collect();
        let cols: Vec<usize> = (window.col_off..window.col_off + window.width).collect();
        let dims = (self.meta.width, self.meta.height);
        sample_grid(&mut self.decoder, dims, self.meta.band_count, &rows, &cols, bands)
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
        let dims = (self.meta.width, self.meta.height);
        sample_grid(&mut self.decoder, dims, self.meta.band_count, &rows, &cols, bands)
    }

    fn read_overview(&mut self, level: usize, bands: &[usize]) -> Result<PixelBlock> {
        validate_bands(bands, self.meta.band_count)?;
        let (&ifd, &(width, height)) = self
            .overview_ifds
            .get(level)
            .zip(self.meta.overviews.get(level))
            .ok_or_else(|| Error::InvalidParameter {
                name: "level",
                value: level.to_string(),
                reason: format!("raster has {} overview(s)", self.overview_ifds.len()),
            })?;

        // Overview IFDs are read through a short-lived second decoder so the
        // main one stays positioned on the full-resolution image.
        let mut decoder = open_decoder(&self.path)?;
        for _ in 0..ifd {
            decoder.next_image()?;
        }
        let rows: Vec<usize> = (0..height).collect();
        let cols: Vec<usize> = (0..width).collect();
        sample_grid(&mut decoder, (width, height), self.meta.band_count, &rows, &cols, bands)
    }
}

fn open_decoder(path: &Path) -> Result<FileDecoder> {
    let file = File::open(path).map_err(|e| Error::raster_load(path, e))?;
    Decoder::new(BufReader::new(file))
        .map(|d| d.with_limits(Limits::unlimited()))
        .map_err(|e| Error::raster_load(path, format!("TIFF decode error: {}", e)))
}

fn samples_per_pixel<R: Read + Seek>(decoder: &mut Decoder<R>) -> usize {
    decoder
        .get_tag_u32(Tag::SamplesPerPixel)
        .map(|n| n.max(1) as usize)
        .unwrap_or(1)
}

fn check_chunky<R: Read + Seek>(decoder: &mut Decoder<R>) -> std::result::Result<(), String> {
    match decoder.get_tag_u32(Tag::PlanarConfiguration) {
        Ok(2) => Err("band-sequential (planar) TIFFs are not supported".into()),
        _ => Ok(()),
    }
}

fn sample_type<R: Read + Seek>(decoder: &mut Decoder<R>) -> std::result::Result<SampleType, String> {
    let bits = decoder
        .get_tag_u32_vec(Tag::BitsPerSample)
        .ok()
        .and_then(|v| v.first().copied())
        .unwrap_or(1);
    let format = decoder
        .get_tag_u32_vec(Tag::SampleFormat)
        .ok()
        .and_then(|v| v.first().copied())
        .map(|code| SampleFormat::from_u16_exhaustive(code as u16))
        .unwrap_or(SampleFormat::Uint);

    let ty = match (format, bits) {
        (SampleFormat::Uint, 8) => SampleType::U8,
        (SampleFormat::Uint, 16) => SampleType::U16,
        (SampleFormat::Uint, 32) => SampleType::U32,
        (SampleFormat::Uint, 64) => SampleType::U64,
        (SampleFormat::Int, 8) => SampleType::I8,
        (SampleFormat::Int, 16) => SampleType::I16,
        (SampleFormat::Int, 32) => SampleType::I32,
        (SampleFormat::Int, 64) => SampleType::I64,
        (SampleFormat::IEEEFP, 32) => SampleType::F32,
        (SampleFormat::IEEEFP, 64) => SampleType::F64,
        (other, bits) => return Err(format!("{:?} samples of {} bits are not supported", other, bits)),
    };
    Ok(ty)
}

/// List the extra IFDs that are strictly smaller than the base image and
/// carry the same band layout.
fn scan_overviews(
    path: &Path,
    base: (u32, u32),
    band_count: usize,
) -> Result<(Vec<(usize, usize)>, Vec<usize>)> {
    let mut decoder = open_decoder(path)?;
    let mut sizes = Vec::new();
    let mut ifds = Vec::new();
    let mut ifd = 0usize;

    while decoder.more_images() {
        if let Err(e) = decoder.next_image() {
            debug!("Stopping IFD scan of {} at #{}: {}", path.display(), ifd + 1, e);
            break;
        }
        ifd += 1;
        let Ok((w, h)) = decoder.dimensions() else {
            continue;
        };
        if w < base.0 && h < base.1 && samples_per_pixel(&mut decoder) == band_count {
            sizes.push((w as usize, h as usize));
            ifds.push(ifd);
        }
    }

    Ok((sizes, ifds))
}

/// Gather `bands` at every (row, col) pair of the requested grid, decoding
/// each strip/tile that holds at least one requested pixel exactly once.
fn sample_grid<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    (width, height): (usize, usize),
    band_count: usize,
    rows: &[usize],
    cols: &[usize],
    bands: &[usize],
) -> Result<PixelBlock> {
    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let (chunk_w, chunk_h) = (chunk_w.max(1) as usize, chunk_h.max(1) as usize);
    let chunks_across = width.div_ceil(chunk_w);

    // chunk row/col -> [(output index, offset inside chunk)]
    let mut row_groups: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
    for (out, &r) in rows.iter().enumerate() {
        row_groups.entry(r / chunk_h).or_default().push((out, r % chunk_h));
    }
    let mut col_groups: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
    for (out, &c) in cols.iter().enumerate() {
        col_groups.entry(c / chunk_w).or_default().push((out, c % chunk_w));
    }

    let mut block = Array3::<f64>::zeros((rows.len(), cols.len(), bands.len()));

    for (&ty, row_hits) in &row_groups {
        let rows_in_chunk = chunk_h.min(height - ty * chunk_h);
        for (&tx, col_hits) in &col_groups {
            let cols_in_chunk = chunk_w.min(width - tx * chunk_w);
            let index = (ty * chunks_across + tx) as u32;
            let samples = widen(decoder.read_chunk(index)?)?;

            // Edge chunks come back cropped; fall back to the padded stride
            // for encoders that store full-size edge tiles.
            let stride = if samples.len() == rows_in_chunk * cols_in_chunk * band_count {
                cols_in_chunk
            } else {
                chunk_w
            };
            let needed = ((rows_in_chunk - 1) * stride + cols_in_chunk) * band_count;
            if samples.len() < needed {
                return Err(Error::Other(format!(
                    "chunk {} holds {} samples, expected at least {}",
                    index,
                    samples.len(),
                    needed
                )));
            }

            for &(out_r, local_r) in row_hits {
                for &(out_c, local_c) in col_hits {
                    let base = (local_r * stride + local_c) * band_count;
                    for (k, &band) in bands.iter().enumerate() {
                        block[[out_r, out_c, k]] = samples[base + band];
                    }
                }
            }
        }
    }

    Ok(block)
}

/// Widen any integer or float chunk to `f64`.
fn widen(result: DecodingResult) -> Result<Vec<f64>> {
    let samples = match result {
        DecodingResult::U8(buf) => to_f64(buf),
        DecodingResult::U16(buf) => to_f64(buf),
        DecodingResult::U32(buf) => to_f64(buf),
        DecodingResult::U64(buf) => to_f64(buf),
        DecodingResult::I8(buf) => to_f64(buf),
        DecodingResult::I16(buf) => to_f64(buf),
        DecodingResult::I32(buf) => to_f64(buf),
        DecodingResult::I64(buf) => to_f64(buf),
        DecodingResult::F32(buf) => to_f64(buf),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };
    Ok(samples)
}

fn to_f64<T: ToPrimitive>(buf: Vec<T>) -> Vec<f64> {
    buf.into_iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect()
}
