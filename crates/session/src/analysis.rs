//! Change analysis over a loaded image pair
//!
//! Full-resolution pixels go through the detector registry; mismatched
//! sizes are brought together with area interpolation first. The mask
//! becomes a transparent overlay, area statistics use image A's pixel
//! scale, and a report document collects everything for export.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use geoshift_algorithms::imagery::{align_pair, to_rgb8_pair, ChangeResult, DetectionMethod, DetectorRegistry, StatValue};
use geoshift_algorithms::statistics::{calculate_area, render_overlay, AreaStats};
use geoshift_core::io::write_mask_geotiff;
use geoshift_core::{GeoTransform, PixelBlock, Result};

use crate::artifacts::{ArtifactHandle, ArtifactKind, ArtifactStore};
use crate::ingest::RasterHandle;

/// One side of an analysis: the loaded raster and its full pixels.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub raster: Arc<RasterHandle>,
    pub pixels: PixelBlock,
}

impl AnalysisInput {
    pub fn new(raster: Arc<RasterHandle>, pixels: PixelBlock) -> Self {
        Self { raster, pixels }
    }
}

/// Data handed to an external report exporter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportData {
    pub analysis_type: String,
    pub detector_name: String,
    pub method: DetectionMethod,
    pub image_a: String,
    pub image_b: String,
    pub preview_a: PathBuf,
    pub preview_b: PathBuf,
    pub overlay: PathBuf,
    pub statistics: BTreeMap<String, StatValue>,
    pub area: AreaStats,
    /// Grid both images were resized to, as (rows, cols)
    pub resized_to: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: ChangeResult,
    pub overlay: ArtifactHandle,
    pub area: AreaStats,
    pub resized_to: Option<(usize, usize)>,
    /// GeoTIFF of the mask, when requested
    pub mask_export: Option<ArtifactHandle>,
    pub report: ReportData,
}

impl AnalysisOutcome {
    pub fn detector(&self) -> &str {
        &self.result.stats.detector
    }

    pub fn percentage(&self) -> f64 {
        self.result.stats.percentage
    }
}

pub struct ChangeAnalyzer {
    registry: Arc<DetectorRegistry>,
    store: Arc<ArtifactStore>,
    overlay_alpha: u8,
}

impl ChangeAnalyzer {
    pub fn new(registry: Arc<DetectorRegistry>, store: Arc<ArtifactStore>, overlay_alpha: u8) -> Self {
        Self {
            registry,
            store,
            overlay_alpha,
        }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Run detector `key` on `a` (before) and `b` (after).
    pub fn run(&self, key: &str, a: &AnalysisInput, b: &AnalysisInput, export_mask: bool) -> Result<AnalysisOutcome> {
        let detector = self.registry.get(key)?;

        // One shared byte scale, so unchanged wide samples compare equal
        let (img_a, img_b) = to_rgb8_pair(
            &a.pixels,
            a.raster.metadata.sample_type,
            a.raster.nodata(),
            &b.pixels,
            b.raster.metadata.sample_type,
            b.raster.nodata(),
        );
        let (img_a, img_b, resized_to) = align_pair(img_a, img_b)?;

        let result = detector.detect(&img_a, &img_b)?;
        debug!(
            "{}: {} of {} pixels changed",
            key, result.stats.changed_pixels, result.stats.total_pixels
        );

        let material = self.material(key, a, b);
        let stem = format!("{}_{}", key, file_stem(&a.raster));

        let overlay = self.store.write_rgba_png(
            ArtifactKind::Overlay,
            &stem,
            material.as_bytes(),
            &render_overlay(&result.mask, self.overlay_alpha),
        )?;

        let transform = mask_transform(&a.raster, resized_to);
        let area = calculate_area(&result.mask, transform.pixel_width, transform.pixel_height);

        let mask_export = if export_mask {
            let crs = a.raster.crs().cloned();
            let mask = &result.mask;
            Some(self.store.write_with(ArtifactKind::Mask, &stem, material.as_bytes(), |tmp| {
                write_mask_geotiff(tmp, mask, transform, crs)
            })?)
        } else {
            None
        };

        let report = ReportData {
            analysis_type: key.to_string(),
            detector_name: detector.display_name().to_string(),
            method: detector.method(),
            image_a: a.raster.file_name(),
            image_b: b.raster.file_name(),
            preview_a: a.raster.preview.path().to_path_buf(),
            preview_b: b.raster.preview.path().to_path_buf(),
            overlay: overlay.path().to_path_buf(),
            statistics: result.stats.to_map(),
            area,
            resized_to,
        };

        info!(
            "{} change: {:.2}% ({:.2} ha, {})",
            detector.display_name(),
            result.stats.percentage,
            area.area_ha,
            result.stats.change_type
        );

        Ok(AnalysisOutcome {
            result,
            overlay,
            area,
            resized_to,
            mask_export,
            report,
        })
    }

    /// Persist an outcome's report document.
    pub fn write_report(&self, outcome: &AnalysisOutcome) -> Result<ArtifactHandle> {
        let material = format!("{}|{}", outcome.overlay.id(), outcome.report.analysis_type);
        self.store.write_json(
            ArtifactKind::Report,
            &outcome.report.analysis_type,
            material.as_bytes(),
            &outcome.report,
        )
    }

    fn material(&self, key: &str, a: &AnalysisInput, b: &AnalysisInput) -> String {
        format!("{}|{}|{}|{}", key, a.raster.preview.id(), b.raster.preview.id(), self.overlay_alpha)
    }
}

fn file_stem(raster: &RasterHandle) -> String {
    raster
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Image A's transform, scaled to the grid the mask was computed on.
fn mask_transform(raster: &RasterHandle, resized_to: Option<(usize, usize)>) -> GeoTransform {
    let transform = raster.transform();
    match resized_to {
        Some((rows, cols)) if (rows, cols) != (raster.height(), raster.width()) => transform.scaled(
            raster.width() as f64 / cols as f64,
            raster.height() as f64 / rows as f64,
        ),
        _ => transform,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geoshift_core::{Error, RasterMetadata, SampleType};
    use ndarray::Array3;

    struct Fixture {
        _root: tempfile::TempDir,
        store: Arc<ArtifactStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let store = Arc::new(ArtifactStore::new(root.path()).unwrap());
            Self { _root: root, store }
        }

        fn analyzer(&self) -> ChangeAnalyzer {
            ChangeAnalyzer::new(
                Arc::new(DetectorRegistry::with_model_hooks()),
                Arc::clone(&self.store),
                180,
            )
        }

        fn input(&self, name: &str, size: usize, value: f64) -> AnalysisInput {
            self.input_with(name, Array3::from_elem((size, size, 3), value), SampleType::U8)
        }

        fn input_with(&self, name: &str, pixels: PixelBlock, sample_type: SampleType) -> AnalysisInput {
            let (size, _, bands) = pixels.dim();
            let metadata = RasterMetadata {
                width: size,
                height: size,
                band_count: bands,
                sample_type,
                transform: GeoTransform::new(500_000.0, 4_000_000.0, 10.0, -10.0),
                crs: None,
                nodata: None,
                overviews: Vec::new(),
            };
            let raster = Arc::new(RasterHandle {
                path: PathBuf::from(format!("{name}.tif")),
                bounds: metadata.bounds(),
                metadata,
                display_bounds: None,
                preview: self.store.handle(ArtifactKind::Preview, name, name.as_bytes()),
                preview_size: (size, size),
            });
            AnalysisInput::new(raster, pixels)
        }
    }

    #[test]
    fn landuse_on_uniform_change() {
        let fx = Fixture::new();
        let outcome = fx
            .analyzer()
            .run("landuse", &fx.input("a", 8, 10.0), &fx.input("b", 8, 100.0), false)
            .unwrap();

        assert_relative_eq!(outcome.percentage(), 100.0);
        assert!(outcome.overlay.path().exists());
        assert!(outcome.mask_export.is_none());
        // 64 pixels of 100 m²
        assert_relative_eq!(outcome.area.area_m2, 6400.0);
        assert_eq!(outcome.report.image_a, "a.tif");
        assert_eq!(
            outcome.report.statistics.get("change_pixels"),
            Some(&StatValue::Count(64))
        );
    }

    #[test]
    fn wide_pair_flags_only_the_edited_pixel() {
        let fx = Fixture::new();
        let ramp = Array3::from_shape_fn((4, 4, 1), |(r, c, _)| 1000.0 + 60.0 * (r * 4 + c) as f64);
        let mut edited = ramp.clone();
        edited[[2, 2, 0]] = 4000.0;

        let outcome = fx
            .analyzer()
            .run(
                "landuse",
                &fx.input_with("a", ramp, SampleType::U16),
                &fx.input_with("b", edited, SampleType::U16),
                false,
            )
            .unwrap();

        assert_eq!(outcome.result.stats.changed_pixels, 1);
        assert_eq!(outcome.result.mask[[2, 2]], 255);
    }

    #[test]
    fn mismatched_sizes_are_resized_and_rescaled() {
        let fx = Fixture::new();
        let outcome = fx
            .analyzer()
            .run("landuse", &fx.input("a", 100, 0.0), &fx.input("b", 90, 0.0), false)
            .unwrap();

        assert_eq!(outcome.resized_to, Some((90, 90)));
        assert_eq!(outcome.result.mask.dim(), (90, 90));
        assert_eq!(outcome.result.stats.changed_pixels, 0);
        assert_relative_eq!(outcome.percentage(), 0.0);
    }

    #[test]
    fn mask_export_is_written() {
        let fx = Fixture::new();
        let outcome = fx
            .analyzer()
            .run("disaster", &fx.input("a", 4, 0.0), &fx.input("b", 4, 200.0), true)
            .unwrap();

        let export = outcome.mask_export.as_ref().unwrap();
        assert_eq!(export.kind(), ArtifactKind::Mask);
        assert!(export.path().exists());
    }

    #[test]
    fn unknown_and_model_detectors_fail_before_writing() {
        let fx = Fixture::new();
        let analyzer = fx.analyzer();
        let (a, b) = (fx.input("a", 4, 0.0), fx.input("b", 4, 0.0));

        assert!(matches!(analyzer.run("nope", &a, &b, false), Err(Error::UnknownDetector(_))));
        assert!(matches!(
            analyzer.run("landuse_model", &a, &b, false),
            Err(Error::ModelUnavailable { .. })
        ));
        let overlays = std::fs::read_dir(fx.store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("overlay"))
            .count();
        assert_eq!(overlays, 0);
    }

    #[test]
    fn report_round_trips_to_disk() {
        let fx = Fixture::new();
        let analyzer = fx.analyzer();
        let outcome = analyzer
            .run("water", &fx.input("a", 4, 0.0), &fx.input("b", 4, 200.0), false)
            .unwrap();

        let report = analyzer.write_report(&outcome).unwrap();
        let text = std::fs::read_to_string(report.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["analysis_type"], "water");
        assert_eq!(json["method"], "heuristic");
        assert_eq!(json["statistics"]["water_change_pixels"], 16);
    }
}
