//! Full session workflow over GeoTIFFs written with the crate's own writer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use approx::assert_relative_eq;
use ndarray::Array3;

use geoshift_core::io::{write_geotiff_u8, GeoTiffOptions};
use geoshift_core::{GeoTransform, CRS};
use geoshift_session::{LogLevel, RecordingSurface, Session, SessionConfig, Slot, StoreState};

const WAIT: Duration = Duration::from_secs(30);

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// A 3-band UTM 33N scene at 10 m with a bright square in the middle.
    fn scene(&self, name: &str, size: usize, base: u8, square: u8) -> PathBuf {
        let path = self.dir.path().join(name);
        let data = Array3::from_shape_fn((size, size, 3), |(r, c, _)| {
            let inside = (size / 4..size * 3 / 4).contains(&r) && (size / 4..size * 3 / 4).contains(&c);
            if inside {
                square
            } else {
                base
            }
        });
        let options = GeoTiffOptions::georeferenced(
            GeoTransform::new(500_000.0, 4_650_000.0, 10.0, -10.0),
            Some(CRS::from_epsg(32633)),
        );
        write_geotiff_u8(&path, &data, &options).unwrap();
        path
    }

    fn session(&self) -> Session<RecordingSurface> {
        let config = SessionConfig {
            cache_dir: self.dir.path().join("cache"),
            ..SessionConfig::default()
        };
        Session::new(config, RecordingSurface::new()).unwrap()
    }
}

fn load_pair(session: &mut Session<RecordingSurface>, a: &Path, b: &Path) {
    session.load_slot(Slot::A, a);
    session.load_slot(Slot::B, b);
    assert!(session.wait_until_idle(WAIT), "loads did not finish");
}

#[test]
fn loading_both_slots_enters_comparison() {
    let ws = Workspace::new();
    let a = ws.scene("before.tif", 64, 40, 40);
    let b = ws.scene("after.tif", 64, 40, 200);
    let mut session = ws.session();

    session.load_slot(Slot::A, &a);
    assert!(session.wait_until_idle(WAIT));
    assert_eq!(session.layers().state(), StoreState::Single);

    session.load_slot(Slot::B, &b);
    assert!(session.wait_until_idle(WAIT));
    assert_eq!(session.layers().state(), StoreState::Comparison);

    let composite = session.layers().compose();
    let pair = composite.comparison.unwrap();
    assert_eq!((pair.left.as_str(), pair.right.as_str()), ("Image A", "Image B"));
    assert_eq!(composite.layers.len(), 2);

    let raster = session.raster(Slot::A).unwrap();
    assert!(raster.preview.path().exists());
    // Reprojected into longitude/latitude near 15°E
    let display = raster.display_bounds.unwrap();
    assert!(display.left > 14.0 && display.right < 16.0);
    assert!(display.bottom > 41.0 && display.top < 43.0);
}

#[test]
fn analysis_overlays_both_layers_and_reports() {
    let ws = Workspace::new();
    let a = ws.scene("before.tif", 40, 40, 40);
    let b = ws.scene("after.tif", 40, 40, 200);
    let mut session = ws.session();
    load_pair(&mut session, &a, &b);

    let outcome = session.run_analysis("landuse").unwrap();
    // The 20x20 square changed
    assert_eq!(outcome.result.stats.changed_pixels, 400);
    assert_relative_eq!(outcome.percentage(), 25.0);
    assert_relative_eq!(outcome.area.area_m2, 40_000.0);
    assert_relative_eq!(outcome.area.area_ha, 4.0);
    assert!(outcome.overlay.path().exists());

    let composite = session.layers().compose();
    assert!(composite.layers.iter().all(|l| l.overlay.is_some()));

    session.toggle_change(false).unwrap();
    let composite = session.layers().compose();
    assert!(composite.layers.iter().all(|l| l.overlay.is_none()));

    let report = session.export_report().unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report.path()).unwrap()).unwrap();
    assert_eq!(json["analysis_type"], "landuse");
    assert_eq!(json["image_a"], "before.tif");
    assert_eq!(json["statistics"]["change_pixels"], 400);
}

#[test]
fn mismatched_sizes_are_aligned() {
    let ws = Workspace::new();
    let a = ws.scene("big.tif", 100, 60, 60);
    let b = ws.scene("small.tif", 90, 60, 60);
    let mut session = ws.session();
    load_pair(&mut session, &a, &b);

    let outcome = session.run_analysis("landuse").unwrap();
    assert_eq!(outcome.resized_to, Some((90, 90)));
    assert_eq!(outcome.result.stats.changed_pixels, 0);
}

#[test]
fn newer_load_supersedes_older() {
    let ws = Workspace::new();
    let first = ws.scene("first.tif", 32, 10, 10);
    let second = ws.scene("second.tif", 48, 10, 10);
    let mut session = ws.session();

    session.load_slot(Slot::A, &first);
    let generation = session.load_slot(Slot::A, &second);
    assert!(session.wait_until_idle(WAIT));

    assert_eq!(session.slot(Slot::A).generation(), generation);
    let raster = session.raster(Slot::A).unwrap();
    assert_eq!(raster.file_name(), "second.tif");
    assert_eq!(session.slot(Slot::A).path().unwrap(), second);
}

#[test]
fn failed_load_is_reported_not_raised() {
    let ws = Workspace::new();
    let mut session = ws.session();

    session.load_slot(Slot::B, ws.dir.path().join("missing.tif"));
    assert!(session.wait_until_idle(WAIT));

    assert!(session.raster(Slot::B).is_none());
    assert!(session
        .log()
        .iter()
        .any(|e| e.level == LogLevel::Error && e.message.contains("Image B")));
    assert!(session.run_analysis("landuse").is_err());
}

#[test]
fn background_analysis_delivers_by_message() {
    let ws = Workspace::new();
    let a = ws.scene("before.tif", 32, 0, 0);
    let b = ws.scene("after.tif", 32, 0, 250);
    let mut session = ws.session();
    load_pair(&mut session, &a, &b);

    session.spawn_analysis("disaster").unwrap();
    assert!(session.spawn_analysis("disaster").is_err());
    assert!(session.wait_until_idle(WAIT));

    let outcome = session.last_outcome().unwrap();
    assert_eq!(outcome.detector(), "disaster");
    assert_eq!(outcome.result.stats.changed_pixels, 256);
}

#[test]
fn unknown_detector_fails_cleanly() {
    let ws = Workspace::new();
    let a = ws.scene("before.tif", 16, 0, 0);
    let mut session = ws.session();
    load_pair(&mut session, &a, &a);

    assert!(session.run_analysis("glaciers").is_err());
    assert!(session.last_outcome().is_none());
    assert!(session.export_report().is_err());
}
