//! Layers, comparison mode and composites
//!
//! - **store**: ordered layer store that recomposes on change
//! - **surface**: render surfaces receiving the composites

mod store;
mod surface;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use geoshift_core::Bounds;

use crate::artifacts::ArtifactHandle;
use crate::ingest::RasterHandle;

pub use store::{LayerStore, StoreState, COMPARISON_LEFT, COMPARISON_RIGHT};
pub use surface::{JsonFileSurface, RecordingSurface, RenderSurface};

/// A change overlay drawn on top of a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub artifact: ArtifactHandle,
    pub opacity: f32,
    pub visible: bool,
}

impl Overlay {
    pub fn new(artifact: ArtifactHandle, opacity: f32) -> Self {
        Self {
            artifact,
            opacity: opacity.clamp(0.0, 1.0),
            visible: true,
        }
    }
}

/// One named raster on the map
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub raster: Arc<RasterHandle>,
    pub overlay: Option<Overlay>,
    pub visible: bool,
    /// Clamped to 0..=1
    pub opacity: f32,
    pub bounds: Bounds,
}

impl Layer {
    /// Visible, fully opaque layer with no overlay.
    pub fn new(name: impl Into<String>, raster: Arc<RasterHandle>) -> Self {
        let bounds = raster.layer_bounds();
        Self {
            name: name.into(),
            raster,
            overlay: None,
            visible: true,
            opacity: 1.0,
            bounds,
        }
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

/// Image drawn in a composite
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeImage {
    pub image: PathBuf,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeLayer {
    pub name: String,
    pub bounds: Bounds,
    pub base: CompositeImage,
    pub overlay: Option<CompositeImage>,
}

/// Left/right pair shown in comparison mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonPair {
    pub left: String,
    pub right: String,
}

/// Everything a surface needs to draw the current state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composite {
    /// View centre (x, y)
    pub center: (f64, f64),
    pub zoom: u8,
    /// Visible layers in insertion order
    pub layers: Vec<CompositeLayer>,
    pub comparison: Option<ComparisonPair>,
}
