//! Water index and water masking
//!
//! McFeeters NDWI from green and near-infrared bands, plus the threshold
//! step that turns it into a binary water mask.

use ndarray::Array2;
use crate::maybe_rayon::*;
use geoshift_core::{Error, Result};

/// Substitute for a zero `green + nir` denominator.
const ZERO_DENOMINATOR: f64 = 1e-6;

/// Default NDWI threshold above which a pixel counts as water
pub const DEFAULT_WATER_THRESHOLD: f64 = 0.2;

/// Normalized Difference Water Index (McFeeters, 1996)
///
/// `NDWI = (Green - NIR) / (Green + NIR)`
///
/// Positive values indicate water bodies. Pixels whose denominator is zero
/// divide by `1e-6` instead, so `0 / 0` yields 0 rather than NaN.
///
/// # Arguments
/// * `green` - Green band
/// * `nir` - Near-infrared band
pub fn compute_ndwi(green: &Array2<f64>, nir: &Array2<f64>) -> Result<Array2<f64>> {
    let (rows, cols) = green.dim();
    if nir.dim() != (rows, cols) {
        return Err(Error::dimension_mismatch((rows, cols), nir.dim()));
    }

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = Vec::with_capacity(cols);
            for col in 0..cols {
                let g = green[[row, col]];
                let n = nir[[row, col]];
                let mut sum = g + n;
                if sum == 0.0 {
                    sum = ZERO_DENOMINATOR;
                }
                row_data.push((g - n) / sum);
            }
            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}

/// Binary water mask: 1 where `ndwi > threshold`, else 0. NaN is never water.
pub fn threshold_water(ndwi: &Array2<f64>, threshold: f64) -> Array2<u8> {
    ndwi.mapv(|v| u8::from(v > threshold))
}
