//! Percentile contrast stretch and preview composition
//!
//! Turns a decimated pixel block of any sample type into a display-ready
//! RGBA image: invalid pixels become transparent, each band is stretched
//! between its low/high percentiles of valid pixels, and dark scenes get a
//! gamma lift.

use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::maybe_rayon::*;
use geoshift_core::{Algorithm, Error, PixelBlock, Result};

/// Parameters for the preview stretch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchParams {
    /// Lower clip percentile (0-100)
    pub low_percentile: f64,
    /// Upper clip percentile (0-100)
    pub high_percentile: f64,
    /// Mean stretched brightness below which gamma is applied
    pub dark_threshold: f64,
    /// Gamma used to brighten dark scenes: `out = 255 (in / 255)^(1 / gamma)`
    pub gamma: f64,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            low_percentile: 2.0,
            high_percentile: 98.0,
            dark_threshold: 50.0,
            gamma: 1.5,
        }
    }
}

/// Preview renderer as an [`Algorithm`]: (pixel block, nodata) → RGBA.
#[derive(Debug, Clone, Default)]
pub struct PreviewRenderer;

impl Algorithm for PreviewRenderer {
    type Input = (PixelBlock, Option<f64>);
    type Output = Array3<u8>;
    type Params = StretchParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "PreviewRenderer"
    }

    fn description(&self) -> &'static str {
        "Percentile contrast stretch with nodata transparency and dark-scene gamma"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        render_preview(&input.0, input.1, &params)
    }
}

/// Compose an RGBA preview from a `(rows, cols, bands)` block.
///
/// Three or more bands map to RGB; fewer use the first band as grey.
/// Alpha is 255 where every used band is valid, 0 elsewhere.
pub fn render_preview(block: &PixelBlock, nodata: Option<f64>, params: &StretchParams) -> Result<Array3<u8>> {
    validate(params)?;
    let (rows, cols, bands) = block.dim();
    if rows == 0 || cols == 0 || bands == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let used: Vec<usize> = if bands >= 3 { vec![0, 1, 2] } else { vec![0] };
    let valid = validity_mask(block, &used, nodata);

    let mut stretched: Vec<Array2<u8>> = used
        .par_iter()
        .map(|&b| stretch_band(block.index_axis(Axis(2), b), &valid, params))
        .collect();

    let (sum, count) = stretched.iter().fold((0u64, 0u64), |acc, band| {
        band.iter()
            .zip(valid.iter())
            .filter(|(_, &ok)| ok)
            .fold(acc, |(s, n), (&v, _)| (s + v as u64, n + 1))
    });
    if count > 0 && (sum as f64 / count as f64) < params.dark_threshold {
        let lut = gamma_lut(params.gamma);
        for band in &mut stretched {
            band.mapv_inplace(|v| lut[v as usize]);
        }
    }

    let mut rgba = Array3::<u8>::zeros((rows, cols, 4));
    for r in 0..rows {
        for c in 0..cols {
            if !valid[[r, c]] {
                continue;
            }
            for ch in 0..3 {
                let band = &stretched[ch.min(stretched.len() - 1)];
                rgba[[r, c, ch]] = band[[r, c]];
            }
            rgba[[r, c, 3]] = 255;
        }
    }
    Ok(rgba)
}

/// Per-pixel validity over `bands`, combined with AND.
///
/// A sample is invalid if it is NaN or equals `nodata`. Without a declared
/// nodata, a band whose minimum is exactly 0 treats 0 as nodata.
pub fn validity_mask(block: &PixelBlock, bands: &[usize], nodata: Option<f64>) -> Array2<bool> {
    let (rows, cols, _) = block.dim();
    let mut valid = Array2::from_elem((rows, cols), true);

    for &b in bands {
        let band = block.index_axis(Axis(2), b);
        let sentinel = match nodata {
            Some(v) => Some(v),
            None => {
                let min = band.iter().copied().filter(|v| !v.is_nan()).fold(f64::INFINITY, f64::min);
                (min == 0.0).then_some(0.0)
            }
        };

        ndarray::Zip::from(&mut valid).and(&band).for_each(|ok, &v| {
            let is_nodata = match sentinel {
                Some(s) if s.is_nan() => v.is_nan(),
                Some(s) => v == s,
                None => false,
            };
            if v.is_nan() || is_nodata {
                *ok = false;
            }
        });
    }
    valid
}

/// Linear-interpolated percentile of an ascending slice (numpy's default).
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Stretch one band to 0..255 between its percentiles of valid pixels.
///
/// A collapsed range (high <= low) or a band with no valid pixels yields
/// all zeros.
fn stretch_band(band: ArrayView2<'_, f64>, valid: &Array2<bool>, params: &StretchParams) -> Array2<u8> {
    let mut samples: Vec<f64> = band
        .iter()
        .zip(valid.iter())
        .filter(|(_, &ok)| ok)
        .map(|(&v, _)| v)
        .collect();
    samples.sort_unstable_by(f64::total_cmp);

    let range = percentile(&samples, params.low_percentile).zip(percentile(&samples, params.high_percentile));
    match range {
        Some((lo, hi)) if hi > lo => {
            let scale = 255.0 / (hi - lo);
            band.mapv(|v| ((v - lo) * scale).clamp(0.0, 255.0).round() as u8)
        }
        _ => Array2::zeros(band.dim()),
    }
}

fn gamma_lut(gamma: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = (255.0 * (i as f64 / 255.0).powf(1.0 / gamma)).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

fn validate(params: &StretchParams) -> Result<()> {
    if !(0.0..=100.0).contains(&params.low_percentile)
        || !(0.0..=100.0).contains(&params.high_percentile)
        || params.low_percentile >= params.high_percentile
    {
        return Err(Error::InvalidParameter {
            name: "percentiles",
            value: format!("{}..{}", params.low_percentile, params.high_percentile),
            reason: "need 0 <= low < high <= 100".into(),
        });
    }
    if !(params.gamma > 0.0) {
        return Err(Error::InvalidParameter {
            name: "gamma",
            value: params.gamma.to_string(),
            reason: "must be positive".into(),
        });
    }
    Ok(())
}
