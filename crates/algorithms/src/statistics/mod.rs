//! Statistics over binary change masks
//!
//! - **area**: Mask area in m² and hectares, two-mask comparison, change classification
//! - **change_map**: Tri-colour change maps and transparent overlays

pub mod area;
pub mod change_map;

pub use area::{
    calculate_area, calculate_change_area, classify_change_type, AreaStats, ChangeArea,
    ChangeDirection, ChangeType,
};
pub use change_map::{generate_change_map, render_overlay, OVERLAY_ALPHA};
