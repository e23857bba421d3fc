//! End-to-end checks of the detector pipeline: align, detect, measure.

use approx::assert_relative_eq;
use ndarray::{Array2, Array3};

use geoshift_algorithms::imagery::{align_pair, ChangeDetector, DetectorRegistry, Heuristic};
use geoshift_algorithms::statistics::{calculate_area, generate_change_map, render_overlay, OVERLAY_ALPHA};
use geoshift_core::Error;

fn gradient(rows: usize, cols: usize) -> Array3<u8> {
    Array3::from_shape_fn((rows, cols, 3), |(r, c, ch)| ((r * 2 + c + ch * 20) % 256) as u8)
}

#[test]
fn mismatched_pair_is_rejected_then_recovered_by_alignment() {
    let registry = DetectorRegistry::with_defaults();
    let a = gradient(100, 100);
    let b = gradient(90, 90);

    assert!(matches!(
        registry.detect("landuse", &a, &b),
        Err(Error::DimensionMismatch { er: 100, ec: 100, ar: 90, ac: 90 })
    ));

    let (a, b, target) = align_pair(a, b).unwrap();
    assert_eq!(target, Some((90, 90)));
    let result = registry.detect("landuse", &a, &b).unwrap();
    assert_eq!(result.mask.dim(), (90, 90));
    assert_eq!(result.stats.total_pixels, 8100);
}

#[test]
fn every_default_detector_yields_canonical_masks() {
    let registry = DetectorRegistry::with_defaults();
    let a = gradient(32, 32);
    let b = a.mapv(|v| v.wrapping_add(97));

    for info in registry.available() {
        let result = registry.detect(&info.key, &a, &b).unwrap();
        assert!(
            result.mask.iter().all(|&v| v == 0 || v == 255),
            "{} produced a non-binary mask",
            info.key
        );
        assert_eq!(result.stats.total_pixels, 32 * 32);
        assert!((0.0..=100.0).contains(&result.stats.percentage));
        assert_eq!(result.stats.to_map().len(), 4);
    }
}

#[test]
fn detector_keys_follow_registration_order() {
    let keys: Vec<String> = DetectorRegistry::with_defaults()
        .available()
        .into_iter()
        .map(|d| d.key)
        .collect();
    assert_eq!(keys, ["landuse", "deforestation", "water", "structures", "disaster"]);
}

#[test]
fn mask_area_at_ten_metres() {
    let a = Array3::from_elem((10, 10, 3), 0u8);
    let mut b = a.clone();
    for r in 0..5 {
        for c in 0..10 {
            for ch in 0..3 {
                b[[r, c, ch]] = 255;
            }
        }
    }
    let mask = Heuristic::Landuse.detect(&a, &b).unwrap().mask;
    let area = calculate_area(&mask, 10.0, -10.0);
    assert_eq!(area.true_pixels, 50);
    assert_relative_eq!(area.area_m2, 5000.0);
    assert_relative_eq!(area.area_ha, 0.5);
    assert_relative_eq!(area.percent_coverage, 50.0);
}

#[test]
fn overlay_and_change_map_agree_on_changed_pixels() {
    let mut mask = Array2::<u8>::zeros((4, 4));
    mask[[1, 1]] = 255;
    mask[[2, 3]] = 255;

    let overlay = render_overlay(&mask, OVERLAY_ALPHA);
    let map = generate_change_map(&mask, &mask).unwrap();
    for ((r, c), &m) in mask.indexed_iter() {
        let visible = overlay[[r, c, 3]] != 0;
        let coloured = map[[r, c, 0]] != 0;
        assert_eq!(visible, m != 0);
        assert_eq!(coloured, m != 0);
    }
}
