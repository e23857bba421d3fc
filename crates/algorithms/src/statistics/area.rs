//! Area statistics for binary masks
//!
//! A mask pixel is "true" when nonzero, so both {0,1} and {0,255} masks
//! work. Pixel area is `|pixel_width * pixel_height|` in the raster's
//! linear units squared (m² for projected rasters).

use std::fmt;

use ndarray::Array2;
use serde::Serialize;
use geoshift_core::{Error, Result};

const M2_PER_HECTARE: f64 = 10_000.0;

/// Area covered by the true pixels of one mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AreaStats {
    pub true_pixels: usize,
    pub total_pixels: usize,
    pub area_m2: f64,
    pub area_ha: f64,
    pub percent_coverage: f64,
}

/// Whether the true area grew or shrank between two masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeDirection {
    Gain,
    Loss,
    NoChange,
}

impl fmt::Display for ChangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeDirection::Gain => "gain",
            ChangeDirection::Loss => "loss",
            ChangeDirection::NoChange => "no-change",
        })
    }
}

/// Before/after comparison of two masks over the same grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChangeArea {
    pub before: AreaStats,
    pub after: AreaStats,
    pub change_area_m2: f64,
    pub change_area_ha: f64,
    pub change_percentage: f64,
    pub change_type: ChangeDirection,
}

/// Qualitative magnitude of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Less than 1% of pixels changed
    Minimal,
    /// Less than 10% of pixels changed
    Moderate,
    Significant,
}

impl ChangeType {
    /// Classify a changed fraction in `0.0..=1.0`.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.01 {
            ChangeType::Minimal
        } else if ratio < 0.1 {
            ChangeType::Moderate
        } else {
            ChangeType::Significant
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Minimal => "minimal",
            ChangeType::Moderate => "moderate",
            ChangeType::Significant => "significant",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Area of the true pixels in `mask`.
///
/// # Arguments
/// * `mask` - Binary mask, nonzero = true
/// * `pixel_width`, `pixel_height` - Pixel size; sign is ignored
pub fn calculate_area(mask: &Array2<u8>, pixel_width: f64, pixel_height: f64) -> AreaStats {
    let pixel_area = (pixel_width * pixel_height).abs();
    let true_pixels = mask.iter().filter(|&&v| v != 0).count();
    let total_pixels = mask.len();

    let area_m2 = pixel_area * true_pixels as f64;
    AreaStats {
        true_pixels,
        total_pixels,
        area_m2,
        area_ha: area_m2 / M2_PER_HECTARE,
        percent_coverage: ratio(true_pixels as f64, total_pixels as f64) * 100.0,
    }
}

/// Compare the true area of two masks on the same grid.
///
/// `change_percentage` is the absolute area difference relative to the
/// whole grid's area.
pub fn calculate_change_area(
    before: &Array2<u8>,
    after: &Array2<u8>,
    pixel_width: f64,
    pixel_height: f64,
) -> Result<ChangeArea> {
    if before.dim() != after.dim() {
        return Err(Error::dimension_mismatch(before.dim(), after.dim()));
    }

    let b = calculate_area(before, pixel_width, pixel_height);
    let a = calculate_area(after, pixel_width, pixel_height);
    let change_area_m2 = (a.area_m2 - b.area_m2).abs();
    let grid_area = (pixel_width * pixel_height).abs() * b.total_pixels as f64;

    let change_type = match a.true_pixels.cmp(&b.true_pixels) {
        std::cmp::Ordering::Greater => ChangeDirection::Gain,
        std::cmp::Ordering::Less => ChangeDirection::Loss,
        std::cmp::Ordering::Equal => ChangeDirection::NoChange,
    };

    Ok(ChangeArea {
        before: b,
        after: a,
        change_area_m2,
        change_area_ha: change_area_m2 / M2_PER_HECTARE,
        change_percentage: ratio(change_area_m2, grid_area) * 100.0,
        change_type,
    })
}

/// Classify a difference mask by the fraction of nonzero pixels.
pub fn classify_change_type(diff_mask: &Array2<u8>) -> ChangeType {
    let changed = diff_mask.iter().filter(|&&v| v != 0).count();
    ChangeType::from_ratio(ratio(changed as f64, diff_mask.len() as f64))
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn area_of_three_ten_metre_pixels() {
        let mask = array![[1u8, 1], [0, 1]];
        let stats = calculate_area(&mask, 10.0, -10.0);
        assert_eq!(stats.true_pixels, 3);
        assert_relative_eq!(stats.area_m2, 300.0);
        assert_relative_eq!(stats.area_ha, 0.03);
        assert_relative_eq!(stats.percent_coverage, 75.0);
    }

    #[test]
    fn byte_masks_count_the_same() {
        let mask = array![[255u8, 255], [0, 255]];
        assert_relative_eq!(calculate_area(&mask, 10.0, 10.0).area_m2, 300.0);
    }

    #[test]
    fn empty_mask_has_zero_coverage() {
        let mask = Array2::<u8>::zeros((0, 0));
        let stats = calculate_area(&mask, 10.0, 10.0);
        assert_eq!(stats.percent_coverage, 0.0);
        assert_eq!(stats.area_m2, 0.0);
    }

    #[test]
    fn change_area_gain() {
        let before = array![[1u8, 0], [0, 0]];
        let after = array![[1u8, 1], [1, 0]];
        let change = calculate_change_area(&before, &after, 10.0, -10.0).unwrap();
        assert_relative_eq!(change.change_area_m2, 200.0);
        assert_relative_eq!(change.change_area_ha, 0.02);
        assert_relative_eq!(change.change_percentage, 50.0);
        assert_eq!(change.change_type, ChangeDirection::Gain);
        assert_eq!(change.change_type.to_string(), "gain");
    }

    #[test]
    fn change_area_loss_and_none() {
        let full = Array2::from_elem((3, 3), 1u8);
        let empty = Array2::<u8>::zeros((3, 3));
        let loss = calculate_change_area(&full, &empty, 1.0, 1.0).unwrap();
        assert_eq!(loss.change_type, ChangeDirection::Loss);
        assert_relative_eq!(loss.change_percentage, 100.0);

        let same = calculate_change_area(&full, &full, 1.0, 1.0).unwrap();
        assert_eq!(same.change_type, ChangeDirection::NoChange);
        assert_eq!(same.change_area_m2, 0.0);
    }

    #[test]
    fn zero_pixel_size_never_divides_by_zero() {
        let a = array![[1u8]];
        let change = calculate_change_area(&a, &Array2::zeros((1, 1)), 0.0, 0.0).unwrap();
        assert_eq!(change.change_percentage, 0.0);
    }

    #[test]
    fn change_area_requires_matching_shapes() {
        let a = Array2::<u8>::zeros((2, 2));
        let b = Array2::<u8>::zeros((3, 2));
        assert!(calculate_change_area(&a, &b, 1.0, 1.0).is_err());
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(ChangeType::from_ratio(0.0), ChangeType::Minimal);
        assert_eq!(ChangeType::from_ratio(0.0099), ChangeType::Minimal);
        assert_eq!(ChangeType::from_ratio(0.01), ChangeType::Moderate);
        assert_eq!(ChangeType::from_ratio(0.1), ChangeType::Significant);

        let mut mask = Array2::<u8>::zeros((10, 10));
        mask[[0, 0]] = 255;
        assert_eq!(classify_change_type(&mask), ChangeType::Moderate);
        assert_eq!(classify_change_type(&Array2::zeros((0, 3))), ChangeType::Minimal);
    }
}
