//! Change maps and overlays
//!
//! `generate_change_map` compares two distinct masks (before/after) and
//! colours loss, gain and persistence. `render_overlay` draws a single
//! detection mask as a transparent RGBA layer for display over imagery.

use ndarray::{Array2, Array3, Zip};
use geoshift_core::{Error, Result};

/// Alpha given to changed pixels in an overlay (about 70%)
pub const OVERLAY_ALPHA: u8 = 180;

const LOSS: [u8; 3] = [255, 0, 0];
const GAIN: [u8; 3] = [0, 255, 0];
const BOTH: [u8; 3] = [255, 255, 0];

/// RGB change map of two masks on the same grid.
///
/// Red where only `mask_a` is set (loss), green where only `mask_b` is set
/// (gain), yellow where both are, black elsewhere.
pub fn generate_change_map(mask_a: &Array2<u8>, mask_b: &Array2<u8>) -> Result<Array3<u8>> {
    if mask_a.dim() != mask_b.dim() {
        return Err(Error::dimension_mismatch(mask_a.dim(), mask_b.dim()));
    }
    let (rows, cols) = mask_a.dim();
    let mut map = Array3::<u8>::zeros((rows, cols, 3));

    Zip::indexed(mask_a).and(mask_b).for_each(|(r, c), &a, &b| {
        let colour = match (a != 0, b != 0) {
            (true, false) => LOSS,
            (false, true) => GAIN,
            (true, true) => BOTH,
            (false, false) => return,
        };
        for (ch, v) in colour.into_iter().enumerate() {
            map[[r, c, ch]] = v;
        }
    });
    Ok(map)
}

/// RGBA overlay of a single mask: changed pixels yellow at `alpha`,
/// everything else fully transparent.
pub fn render_overlay(mask: &Array2<u8>, alpha: u8) -> Array3<u8> {
    let (rows, cols) = mask.dim();
    let mut rgba = Array3::<u8>::zeros((rows, cols, 4));
    Zip::indexed(mask).for_each(|(r, c), &m| {
        if m != 0 {
            rgba[[r, c, 0]] = BOTH[0];
            rgba[[r, c, 1]] = BOTH[1];
            rgba[[r, c, 2]] = BOTH[2];
            rgba[[r, c, 3]] = alpha;
        }
    });
    rgba
}
