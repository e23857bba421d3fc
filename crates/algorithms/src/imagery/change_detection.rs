//! Bi-temporal change detection
//!
//! A [`DetectorRegistry`] maps detector keys to [`ChangeDetector`]s. Each
//! detector takes two aligned 8-bit images (rows, cols, channels) and
//! returns a {0,255} change mask with statistics:
//!
//! - **landuse**: greyscale absolute difference > 30
//! - **deforestation**: green channel drop (before − after) > 40
//! - **water**: channel 0 above 100 in exactly one of the images
//! - **structures**: Canny edges present after but not before
//! - **disaster**: greyscale absolute difference > 50
//!
//! The registry can also hold model entries. These describe a trained model
//! and fail with [`Error::ModelUnavailable`] until one is supplied.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::Serialize;
use tracing::debug;

use crate::imagery::color::rgb_to_gray;
use crate::imagery::edges::{canny, CannyParams};
use crate::maybe_rayon::*;
use crate::statistics::ChangeType;
use geoshift_core::{Error, Result};

/// Greyscale difference threshold for land-use change
pub const LANDUSE_THRESHOLD: u8 = 30;
/// Green-channel drop that counts as vegetation loss
pub const DEFORESTATION_THRESHOLD: i16 = 40;
/// Channel-0 brightness above which a pixel counts as water
pub const WATER_THRESHOLD: u8 = 100;
/// Greyscale difference threshold for damage
pub const DISASTER_THRESHOLD: u8 = 50;

/// How a detector produces its mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Fixed pixel rules
    Heuristic,
    /// A trained model
    Model,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionMethod::Heuristic => "heuristic",
            DetectionMethod::Model => "model",
        })
    }
}

/// One value in a statistics mapping
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Count(usize),
    Percentage(f64),
    Label(String),
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Count(n) => write!(f, "{n}"),
            StatValue::Percentage(p) => write!(f, "{p:.2}"),
            StatValue::Label(s) => f.write_str(s),
        }
    }
}

/// Statistics attached to a change mask
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeStats {
    /// Key of the detector that produced the mask
    pub detector: String,
    pub method: DetectionMethod,
    pub changed_pixels: usize,
    pub total_pixels: usize,
    pub percentage: f64,
    pub change_type: ChangeType,
    #[serde(skip)]
    count_key: &'static str,
    #[serde(skip)]
    percentage_key: &'static str,
}

impl ChangeStats {
    fn from_mask(detector: &str, keys: (&'static str, &'static str), mask: &Array2<u8>) -> Self {
        let changed_pixels = mask.iter().filter(|&&v| v != 0).count();
        let total_pixels = mask.len();
        let ratio = if total_pixels > 0 {
            changed_pixels as f64 / total_pixels as f64
        } else {
            0.0
        };
        Self {
            detector: detector.to_string(),
            method: DetectionMethod::Heuristic,
            changed_pixels,
            total_pixels,
            percentage: ratio * 100.0,
            change_type: ChangeType::from_ratio(ratio),
            count_key: keys.0,
            percentage_key: keys.1,
        }
    }

    /// Statistics under the detector's own key names, e.g.
    /// `deforested_pixels`, `total_pixels`, `deforestation_percentage`.
    pub fn to_map(&self) -> BTreeMap<String, StatValue> {
        let mut map = BTreeMap::new();
        map.insert(self.count_key.to_string(), StatValue::Count(self.changed_pixels));
        map.insert("total_pixels".to_string(), StatValue::Count(self.total_pixels));
        map.insert(self.percentage_key.to_string(), StatValue::Percentage(self.percentage));
        map.insert("change_type".to_string(), StatValue::Label(self.change_type.to_string()));
        map
    }
}

/// Output of a detector
#[derive(Debug, Clone)]
pub struct ChangeResult {
    /// 255 where changed, 0 elsewhere; same grid as the inputs
    pub mask: Array2<u8>,
    pub stats: ChangeStats,
}

/// Registry listing entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorInfo {
    pub key: String,
    pub name: String,
    pub description: String,
    pub method: DetectionMethod,
}

/// A change-detection strategy
pub trait ChangeDetector: Send + Sync {
    /// Registry key
    fn key(&self) -> &str;
    /// Human-readable name
    fn display_name(&self) -> &str;
    fn description(&self) -> &str;
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Heuristic
    }
    /// Compare `before` and `after`, which must share a shape.
    fn detect(&self, before: &Array3<u8>, after: &Array3<u8>) -> Result<ChangeResult>;
}

/// The built-in pixel-rule detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    Landuse,
    Deforestation,
    Water,
    Structures,
    Disaster,
}

impl Heuristic {
    pub const ALL: [Heuristic; 5] = [
        Heuristic::Landuse,
        Heuristic::Deforestation,
        Heuristic::Water,
        Heuristic::Structures,
        Heuristic::Disaster,
    ];

    fn stat_keys(&self) -> (&'static str, &'static str) {
        match self {
            Heuristic::Landuse => ("change_pixels", "change_percentage"),
            Heuristic::Deforestation => ("deforested_pixels", "deforestation_percentage"),
            Heuristic::Water => ("water_change_pixels", "water_change_percentage"),
            Heuristic::Structures => ("new_structure_pixels", "structure_change_percentage"),
            Heuristic::Disaster => ("damaged_pixels", "damage_percentage"),
        }
    }

    fn mask(&self, before: &Array3<u8>, after: &Array3<u8>) -> Result<Array2<u8>> {
        match self {
            Heuristic::Landuse => {
                let (a, b) = (rgb_to_gray(before), rgb_to_gray(after));
                compare(a.view(), b.view(), |x, y| x.abs_diff(y) > LANDUSE_THRESHOLD)
            }
            Heuristic::Disaster => {
                let (a, b) = (rgb_to_gray(before), rgb_to_gray(after));
                compare(a.view(), b.view(), |x, y| x.abs_diff(y) > DISASTER_THRESHOLD)
            }
            Heuristic::Deforestation => {
                let (a, b) = (before.index_axis(Axis(2), 1), after.index_axis(Axis(2), 1));
                compare(a, b, |x, y| x as i16 - y as i16 > DEFORESTATION_THRESHOLD)
            }
            Heuristic::Water => {
                let (a, b) = (before.index_axis(Axis(2), 0), after.index_axis(Axis(2), 0));
                compare(a, b, |x, y| (x > WATER_THRESHOLD) != (y > WATER_THRESHOLD))
            }
            Heuristic::Structures => {
                let edges_a = canny(&rgb_to_gray(before), CannyParams::default())?;
                let edges_b = canny(&rgb_to_gray(after), CannyParams::default())?;
                compare(edges_a.view(), edges_b.view(), |x, y| y != 0 && x == 0)
            }
        }
    }
}

impl ChangeDetector for Heuristic {
    fn key(&self) -> &str {
        match self {
            Heuristic::Landuse => "landuse",
            Heuristic::Deforestation => "deforestation",
            Heuristic::Water => "water",
            Heuristic::Structures => "structures",
            Heuristic::Disaster => "disaster",
        }
    }

    fn display_name(&self) -> &str {
        match self {
            Heuristic::Landuse => "Land-use change",
            Heuristic::Deforestation => "Deforestation",
            Heuristic::Water => "Water body change",
            Heuristic::Structures => "New structures",
            Heuristic::Disaster => "Disaster damage",
        }
    }

    fn description(&self) -> &str {
        match self {
            Heuristic::Landuse => "Greyscale absolute difference above 30",
            Heuristic::Deforestation => "Green channel decrease above 40",
            Heuristic::Water => "Water presence (channel 0 above 100) differs",
            Heuristic::Structures => "Edges present after but not before",
            Heuristic::Disaster => "Greyscale absolute difference above 50",
        }
    }

    fn detect(&self, before: &Array3<u8>, after: &Array3<u8>) -> Result<ChangeResult> {
        validate_pair(before, after)?;

        // Single-channel imagery cannot isolate green or water bands
        if before.dim().2 < 3 && matches!(self, Heuristic::Deforestation | Heuristic::Water) {
            debug!("{} needs 3 channels, falling back to landuse", self.key());
            return Heuristic::Landuse.detect(before, after);
        }

        let mask = self.mask(before, after)?;
        let stats = ChangeStats::from_mask(self.key(), self.stat_keys(), &mask);
        debug!(
            "{}: {} of {} pixels changed ({:.2}%)",
            self.key(),
            stats.changed_pixels,
            stats.total_pixels,
            stats.percentage
        );
        Ok(ChangeResult { mask, stats })
    }
}

/// Placeholder for a trained model; detection reports it as unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDetector {
    pub key: String,
    pub name: String,
    pub description: String,
    pub model_file: String,
    /// Model input size as (rows, cols)
    pub input_size: (usize, usize),
}

impl ModelDetector {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        model_file: impl Into<String>,
        input_size: (usize, usize),
    ) -> Self {
        let description = description.into();
        Self {
            key: key.into(),
            name: description.clone(),
            description,
            model_file: model_file.into(),
            input_size,
        }
    }

    /// Model entries for each built-in analysis, keyed `<analysis>_model`.
    pub fn default_catalog() -> Vec<ModelDetector> {
        [
            ("landuse", "Land-use change detection", "landuse_segmentation.pt"),
            ("deforestation", "Forest cover change detection", "deforestation_detector.pt"),
            ("water", "Water body expansion/retraction", "water_change_detector.pt"),
            ("structures", "New building/infrastructure detection", "structure_detector.pt"),
            ("disaster", "Disaster damage assessment", "disaster_damage_detector.pt"),
        ]
        .into_iter()
        .map(|(key, desc, file)| ModelDetector::new(format!("{key}_model"), desc, file, (256, 256)))
        .collect()
    }
}

impl ChangeDetector for ModelDetector {
    fn key(&self) -> &str {
        &self.key
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Model
    }

    fn detect(&self, before: &Array3<u8>, after: &Array3<u8>) -> Result<ChangeResult> {
        validate_pair(before, after)?;
        Err(Error::ModelUnavailable {
            key: self.key.clone(),
            model_file: self.model_file.clone(),
        })
    }
}

/// Key → detector mapping, in registration order
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn ChangeDetector>>,
}

impl DetectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the five heuristic detectors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for h in Heuristic::ALL {
            registry.register(Box::new(h));
        }
        registry
    }

    /// Defaults plus a model entry per analysis.
    pub fn with_model_hooks() -> Self {
        let mut registry = Self::with_defaults();
        for m in ModelDetector::default_catalog() {
            registry.register(Box::new(m));
        }
        registry
    }

    /// Add a detector, replacing any with the same key in place.
    pub fn register(&mut self, detector: Box<dyn ChangeDetector>) {
        match self.detectors.iter().position(|d| d.key() == detector.key()) {
            Some(i) => self.detectors[i] = detector,
            None => self.detectors.push(detector),
        }
    }

    pub fn get(&self, key: &str) -> Result<&dyn ChangeDetector> {
        self.detectors
            .iter()
            .find(|d| d.key() == key)
            .map(|d| d.as_ref())
            .ok_or_else(|| Error::UnknownDetector(key.to_string()))
    }

    /// Run the detector registered under `key`.
    pub fn detect(&self, key: &str, before: &Array3<u8>, after: &Array3<u8>) -> Result<ChangeResult> {
        self.get(key)?.detect(before, after)
    }

    /// Every registered detector with its method.
    pub fn available(&self) -> Vec<DetectorInfo> {
        self.detectors
            .iter()
            .map(|d| DetectorInfo {
                key: d.key().to_string(),
                name: d.display_name().to_string(),
                description: d.description().to_string(),
                method: d.method(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

fn validate_pair(before: &Array3<u8>, after: &Array3<u8>) -> Result<()> {
    let (rows, cols, channels) = before.dim();
    let (ar, ac, ach) = after.dim();
    if (rows, cols) != (ar, ac) {
        return Err(Error::dimension_mismatch((rows, cols), (ar, ac)));
    }
    if channels != ach {
        return Err(Error::Algorithm(format!(
            "channel count differs: {channels} vs {ach}"
        )));
    }
    if rows == 0 || cols == 0 || channels == 0 {
        return Err(Error::InvalidDimensions { width: cols, height: rows });
    }
    Ok(())
}

/// Pixel-wise rule over two equally shaped single-channel images → {0,255}.
fn compare<F>(a: ArrayView2<'_, u8>, b: ArrayView2<'_, u8>, changed: F) -> Result<Array2<u8>>
where
    F: Fn(u8, u8) -> bool + Sync + Send,
{
    let (rows, cols) = a.dim();
    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = Vec::with_capacity(cols);
            for col in 0..cols {
                let hit = changed(a[[row, col]], b[[row, col]]);
                row_data.push(if hit { 255 } else { 0 });
            }
            row_data
        })
        .collect();
    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}
