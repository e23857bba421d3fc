//! # GeoShift Algorithms
//!
//! Image algorithms for the GeoShift comparison engine.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: Preview stretch, colour conversion, resampling, Canny edges,
//!   NDWI, change detectors and their registry
//! - **statistics**: Mask area, before/after change area, change maps and overlays

pub mod imagery;
mod maybe_rayon;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{
        align_pair, canny, compute_ndwi, render_preview, resize_area, rgb_to_gray,
        threshold_water, to_rgb8, to_rgb8_pair, ChangeDetector, ChangeResult, ChangeStats, DetectionMethod,
        DetectorRegistry, StretchParams,
    };
    pub use crate::statistics::{
        calculate_area, calculate_change_area, classify_change_type, generate_change_map,
        render_overlay, AreaStats, ChangeArea, ChangeType,
    };
    pub use geoshift_core::prelude::*;
}
