//! Band layout and colour conversions for 8-bit imagery

use ndarray::{Array2, Array3, Axis, Zip};
use geoshift_core::{PixelBlock, SampleType};

/// Luma of an RGB image using the ITU-R BT.601 weights, in the same 14-bit
/// fixed point common CV libraries use so results match them bit for bit:
///
/// `Y = (4899 R + 9617 G + 1868 B + 8192) >> 14`
///
/// Single-channel input is returned as is.
pub fn rgb_to_gray(img: &Array3<u8>) -> Array2<u8> {
    let (rows, cols, channels) = img.dim();
    if channels < 3 {
        return img.index_axis(Axis(2), 0).to_owned();
    }

    let mut gray = Array2::<u8>::zeros((rows, cols));
    Zip::from(&mut gray)
        .and(img.lanes(Axis(2)))
        .for_each(|g, px| {
            let (r, gch, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
            *g = ((r * 4899 + gch * 9617 + b * 1868 + 8192) >> 14) as u8;
        });
    gray
}

/// Replicate a single-channel image into three identical channels.
pub fn gray_to_rgb(gray: &Array2<u8>) -> Array3<u8> {
    let (rows, cols) = gray.dim();
    Array3::from_shape_fn((rows, cols, 3), |(r, c, _)| gray[[r, c]])
}

/// Linear map from raw samples onto 0..255
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ByteScale {
    offset: f64,
    scale: f64,
}

impl ByteScale {
    pub const IDENTITY: Self = Self { offset: 0.0, scale: 1.0 };

    /// Fit one map over several blocks at once.
    ///
    /// If every block is byte-typed the map is the identity. Otherwise the
    /// finite samples that are not nodata span 0..255 together; a flat
    /// range maps everything to 0.
    pub fn fit(blocks: &[(&PixelBlock, SampleType, Option<f64>)]) -> Self {
        if blocks.iter().all(|(_, t, _)| t.is_byte()) {
            return Self::IDENTITY;
        }
        let (lo, hi) = blocks
            .iter()
            .flat_map(|&(block, _, nodata)| block.iter().filter(move |&&v| is_valid(v, nodata)))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi > lo {
            Self { offset: lo, scale: 255.0 / (hi - lo) }
        } else {
            Self { offset: lo, scale: 0.0 }
        }
    }

    fn to_byte(self, v: f64, nodata: Option<f64>) -> u8 {
        if is_valid(v, nodata) {
            ((v - self.offset) * self.scale).round().clamp(0.0, 255.0) as u8
        } else {
            0
        }
    }

    /// Apply the map, keeping three bands. One- and two-band blocks use
    /// their first band as grey. Nodata and non-finite samples become 0.
    pub fn apply(self, block: &PixelBlock, nodata: Option<f64>) -> Array3<u8> {
        let (rows, cols, bands) = block.dim();
        if bands >= 3 {
            Array3::from_shape_fn((rows, cols, 3), |(r, c, b)| self.to_byte(block[[r, c, b]], nodata))
        } else {
            Array3::from_shape_fn((rows, cols, 3), |(r, c, _)| self.to_byte(block[[r, c, 0]], nodata))
        }
    }
}

fn is_valid(v: f64, nodata: Option<f64>) -> bool {
    v.is_finite() && nodata.map_or(true, |nd| v != nd)
}

/// Bring a full-resolution pixel block into 3-channel 8-bit form.
///
/// Byte rasters pass through unchanged. Wider types are rescaled linearly
/// from their finite min..max to 0..255 across all bands together, so band
/// ratios survive. One- and two-band blocks use their first band as grey.
pub fn to_rgb8(block: &PixelBlock, sample_type: SampleType) -> Array3<u8> {
    ByteScale::fit(&[(block, sample_type, None)]).apply(block, None)
}

/// Convert a before/after pair with one shared [`ByteScale`], so equal
/// raw values land on equal bytes in both images. Nodata samples are
/// left out of the range and come out as 0.
pub fn to_rgb8_pair(
    a: &PixelBlock,
    a_type: SampleType,
    a_nodata: Option<f64>,
    b: &PixelBlock,
    b_type: SampleType,
    b_nodata: Option<f64>,
) -> (Array3<u8>, Array3<u8>) {
    let scale = ByteScale::fit(&[(a, a_type, a_nodata), (b, b_type, b_nodata)]);
    (scale.apply(a, a_nodata), scale.apply(b, b_nodata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_matches_fixed_point_reference() {
        let img = Array3::from_shape_vec(
            (1, 4, 3),
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 200, 100, 50],
        )
        .unwrap();
        let gray = rgb_to_gray(&img);
        // (255*4899 + 8192) >> 14 = 76, etc.
        assert_eq!(gray.as_slice().unwrap(), &[76, 150, 29, 124]);
    }

    #[test]
    fn white_and_black_are_exact() {
        let img = Array3::from_shape_fn((2, 2, 3), |(r, _, _)| if r == 0 { 255 } else { 0 });
        let gray = rgb_to_gray(&img);
        assert_eq!(gray[[0, 0]], 255);
        assert_eq!(gray[[1, 1]], 0);
    }

    #[test]
    fn byte_blocks_pass_through() {
        let block = PixelBlock::from_shape_fn((2, 3, 4), |(r, c, b)| (r * 10 + c + b * 50) as f64);
        let rgb = to_rgb8(&block, SampleType::U8);
        assert_eq!(rgb.dim(), (2, 3, 3));
        assert_eq!(rgb[[1, 2, 2]], 112);
    }

    #[test]
    fn wide_blocks_are_rescaled_and_gray_replicated() {
        let block = PixelBlock::from_shape_vec((1, 3, 1), vec![1000.0, 1500.0, 2000.0]).unwrap();
        let rgb = to_rgb8(&block, SampleType::U16);
        assert_eq!(rgb.index_axis(Axis(2), 0).iter().copied().collect::<Vec<_>>(), vec![0, 128, 255]);
        assert_eq!(rgb.index_axis(Axis(2), 0), rgb.index_axis(Axis(2), 2));
    }

    #[test]
    fn pair_shares_one_scale() {
        // Identical ramps except one brightened pixel in the second image
        let a = PixelBlock::from_shape_fn((4, 4, 1), |(r, c, _)| 1000.0 + 60.0 * (r * 4 + c) as f64);
        let mut b = a.clone();
        b[[2, 2, 0]] = 4000.0;

        let (ra, rb) = to_rgb8_pair(&a, SampleType::U16, None, &b, SampleType::U16, None);
        let differing = ra.iter().zip(rb.iter()).filter(|(x, y)| x != y).count();
        // Only the edited pixel differs, in all three channels
        assert_eq!(differing, 3);
        assert_eq!(rb[[2, 2, 0]], 255);

        // Scaled separately, nearly every pixel would shift
        let (sa, sb) = (to_rgb8(&a, SampleType::U16), to_rgb8(&b, SampleType::U16));
        assert!(sa.iter().zip(sb.iter()).filter(|(x, y)| x != y).count() > 3);
    }

    #[test]
    fn pair_ignores_nodata_when_fitting() {
        let a = PixelBlock::from_shape_vec((1, 3, 1), vec![-9999.0, 100.0, 200.0]).unwrap();
        let b = PixelBlock::from_shape_vec((1, 3, 1), vec![100.0, 150.0, 200.0]).unwrap();
        let (ra, rb) = to_rgb8_pair(&a, SampleType::I16, Some(-9999.0), &b, SampleType::I16, None);
        assert_eq!(ra.index_axis(Axis(2), 0).iter().copied().collect::<Vec<_>>(), vec![0, 0, 255]);
        assert_eq!(rb.index_axis(Axis(2), 0).iter().copied().collect::<Vec<_>>(), vec![0, 128, 255]);
    }

    #[test]
    fn byte_pair_passes_through() {
        let a = PixelBlock::from_elem((2, 2, 3), 40.0);
        let b = PixelBlock::from_elem((2, 2, 3), 200.0);
        let (ra, rb) = to_rgb8_pair(&a, SampleType::U8, None, &b, SampleType::U8, None);
        assert!(ra.iter().all(|&v| v == 40));
        assert!(rb.iter().all(|&v| v == 200));
    }

    #[test]
    fn flat_wide_block_is_black() {
        let block = PixelBlock::from_elem((2, 2, 3), 7.5);
        assert!(to_rgb8(&block, SampleType::F32).iter().all(|&v| v == 0));
    }

    #[test]
    fn gray_rgb_roundtrip() {
        let gray = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as u8);
        assert_eq!(rgb_to_gray(&gray_to_rgb(&gray)), gray);
    }
}
