//! Canny edge detection on 8-bit greyscale images
//!
//! Sobel 3x3 gradients, L1 magnitude, non-maximum suppression along four
//! quantised directions, then hysteresis: pixels above `high` seed edges
//! that grow through 8-connected neighbours above `low`. No smoothing is
//! applied beforehand. Gradients replicate the outermost pixels, so edges
//! reach the image border.

use std::collections::VecDeque;

use ndarray::Array2;

use crate::maybe_rayon::*;
use geoshift_core::{Algorithm, Error, Result};

/// Hysteresis thresholds on the L1 gradient magnitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannyParams {
    pub low: f64,
    pub high: f64,
}

impl Default for CannyParams {
    fn default() -> Self {
        Self { low: 50.0, high: 150.0 }
    }
}

/// Canny detector as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct Canny;

impl Algorithm for Canny {
    type Input = Array2<u8>;
    type Output = Array2<u8>;
    type Params = CannyParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Canny"
    }

    fn description(&self) -> &'static str {
        "Dual-threshold edge detection with non-maximum suppression"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        canny(&input, params)
    }
}

// tan(22.5°) and tan(67.5°) in 15-bit fixed point
const TG22: i64 = 13573;
const TG67: i64 = 79109;

/// Edge map with 255 on edges and 0 elsewhere.
pub fn canny(gray: &Array2<u8>, params: CannyParams) -> Result<Array2<u8>> {
    if params.low < 0.0 || params.high < params.low {
        return Err(Error::InvalidParameter {
            name: "thresholds",
            value: format!("{}/{}", params.low, params.high),
            reason: "need 0 <= low <= high".into(),
        });
    }
    let (rows, cols) = gray.dim();
    let mut edges = Array2::<u8>::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return Ok(edges);
    }

    // Replicated border: out-of-range indices clamp to the nearest edge pixel
    let px = |r: isize, c: isize| {
        let r = r.clamp(0, rows as isize - 1) as usize;
        let c = c.clamp(0, cols as isize - 1) as usize;
        gray[[r, c]] as i32
    };

    let grads: Vec<(i32, i32)> = (0..rows)
        .into_par_iter()
        .flat_map(|r| {
            let r = r as isize;
            (0..cols as isize)
                .map(|c| {
                    let dx = (px(r - 1, c + 1) + 2 * px(r, c + 1) + px(r + 1, c + 1))
                        - (px(r - 1, c - 1) + 2 * px(r, c - 1) + px(r + 1, c - 1));
                    let dy = (px(r + 1, c - 1) + 2 * px(r + 1, c) + px(r + 1, c + 1))
                        - (px(r - 1, c - 1) + 2 * px(r - 1, c) + px(r - 1, c + 1));
                    (dx, dy)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mag: Vec<i32> = grads.iter().map(|&(dx, dy)| dx.abs() + dy.abs()).collect();
    // Magnitude outside the image counts as zero
    let at = |r: isize, c: isize| {
        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
            0
        } else {
            mag[r as usize * cols + c as usize]
        }
    };

    // Non-maximum suppression: 0 = no, 1 = weak candidate, 2 = strong
    let mut state = vec![0u8; rows * cols];
    for r in 0..rows as isize {
        for c in 0..cols as isize {
            let m = at(r, c);
            if (m as f64) <= params.low {
                continue;
            }
            let (dx, dy) = grads[r as usize * cols + c as usize];
            let (ax, ay) = ((dx as i64).abs(), (dy as i64).abs());
            let ay15 = ay << 15;

            let is_max = if ay15 < ax * TG22 {
                // horizontal gradient: compare left/right
                m > at(r, c - 1) && m >= at(r, c + 1)
            } else if ay15 > ax * TG67 {
                // vertical gradient: compare up/down
                m > at(r - 1, c) && m >= at(r + 1, c)
            } else if (dx ^ dy) < 0 {
                m > at(r - 1, c + 1) && m > at(r + 1, c - 1)
            } else {
                m > at(r - 1, c - 1) && m > at(r + 1, c + 1)
            };

            if is_max {
                state[r as usize * cols + c as usize] = if (m as f64) > params.high { 2 } else { 1 };
            }
        }
    }

    // Hysteresis from strong seeds through weak candidates
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    for r in 0..rows {
        for c in 0..cols {
            if state[r * cols + c] == 2 {
                edges[[r, c]] = 255;
                queue.push_back((r, c));
            }
        }
    }
    while let Some((r, c)) = queue.pop_front() {
        for nr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
            for nc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                if state[nr * cols + nc] == 1 && edges[[nr, nc]] == 0 {
                    edges[[nr, nc]] = 255;
                    queue.push_back((nr, nc));
                }
            }
        }
    }

    Ok(edges)
}
