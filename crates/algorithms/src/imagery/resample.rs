//! Area-interpolated resampling and pair alignment
//!
//! Each output pixel is the average of the input pixels under its footprint,
//! weighted by overlap, which is the standard "area" interpolation for
//! shrinking imagery without aliasing.

use ndarray::Array3;
use tracing::warn;

use crate::maybe_rayon::*;
use geoshift_core::{Error, Result};

/// Source indices and overlap weights for each output cell along one axis.
fn area_weights(src: usize, out: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = src as f64 / out as f64;
    (0..out)
        .map(|i| {
            let start = i as f64 * scale;
            let end = start + scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src);
            (first..last)
                .filter_map(|s| {
                    let overlap = (end.min(s as f64 + 1.0) - start.max(s as f64)).max(0.0);
                    (overlap > 1e-12).then_some((s, overlap / scale))
                })
                .collect()
        })
        .collect()
}

/// Resize a `(rows, cols, channels)` 8-bit image to `out_rows` x `out_cols`
/// using area interpolation.
pub fn resize_area(img: &Array3<u8>, out_rows: usize, out_cols: usize) -> Result<Array3<u8>> {
    let (rows, cols, channels) = img.dim();
    if rows == 0 || cols == 0 || out_rows == 0 || out_cols == 0 {
        return Err(Error::InvalidDimensions {
            width: out_cols,
            height: out_rows,
        });
    }
    if (rows, cols) == (out_rows, out_cols) {
        return Ok(img.clone());
    }

    let row_w = area_weights(rows, out_rows);
    let col_w = area_weights(cols, out_cols);

    let data: Vec<u8> = (0..out_rows)
        .into_par_iter()
        .flat_map(|r| {
            let mut row_data = Vec::with_capacity(out_cols * channels);
            let mut acc = vec![0.0f64; channels];
            for cw in &col_w {
                acc.iter_mut().for_each(|a| *a = 0.0);
                for &(sr, wr) in &row_w[r] {
                    for &(sc, wc) in cw {
                        let w = wr * wc;
                        for (ch, a) in acc.iter_mut().enumerate() {
                            *a += w * img[[sr, sc, ch]] as f64;
                        }
                    }
                }
                row_data.extend(acc.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8));
            }
            row_data
        })
        .collect();

    Array3::from_shape_vec((out_rows, out_cols, channels), data).map_err(|e| Error::Other(e.to_string()))
}

/// Bring two images to a common size before pixel-wise comparison.
///
/// The common size is the smaller extent in each dimension; an image is
/// resized only when its shape differs from it. Returns the aligned pair and,
/// when any resizing happened, the shape both were brought to.
pub fn align_pair(a: Array3<u8>, b: Array3<u8>) -> Result<(Array3<u8>, Array3<u8>, Option<(usize, usize)>)> {
    let (ra, ca, _) = a.dim();
    let (rb, cb, _) = b.dim();
    if (ra, ca) == (rb, cb) {
        return Ok((a, b, None));
    }

    let target = (ra.min(rb), ca.min(cb));
    warn!(
        "{}; {}",
        Error::dimension_mismatch((ra, ca), (rb, cb)),
        resize_note((ra, ca), (rb, cb), target)
    );

    let a = if (ra, ca) == target { a } else { resize_area(&a, target.0, target.1)? };
    let b = if (rb, cb) == target { b } else { resize_area(&b, target.0, target.1)? };
    Ok((a, b, Some(target)))
}

/// Which of the two images gets resized, and to what.
fn resize_note(a: (usize, usize), b: (usize, usize), target: (usize, usize)) -> String {
    let which = match (a != target, b != target) {
        (true, true) => "both images",
        (true, false) => "image A",
        _ => "image B",
    };
    format!(
        "resizing {} to {}x{} with area interpolation",
        which, target.1, target.0
    )
}
