//! Imagery algorithms
//!
//! Algorithms for comparing and displaying optical imagery:
//! - Colour: RGB → luma, grey replication, 8-bit conversion
//! - Stretch: percentile contrast stretch and preview composition
//! - Resample: area-interpolated resize and pair alignment
//! - Edges: Canny edge detection
//! - Indices: NDWI and water masks
//! - Change detection: heuristic detectors and the detector registry

pub mod change_detection;
pub mod color;
pub mod edges;
mod indices;
pub mod resample;
pub mod stretch;

pub use change_detection::{
    ChangeDetector, ChangeResult, ChangeStats, DetectionMethod, DetectorInfo, DetectorRegistry,
    Heuristic, ModelDetector, StatValue,
};
pub use color::{gray_to_rgb, rgb_to_gray, to_rgb8, to_rgb8_pair, ByteScale};
pub use edges::{canny, Canny, CannyParams};
pub use indices::{compute_ndwi, threshold_water, DEFAULT_WATER_THRESHOLD};
pub use resample::{align_pair, resize_area};
pub use stretch::{percentile, render_preview, validity_mask, PreviewRenderer, StretchParams};
