//! Ordered layer store
//!
//! Layers are keyed by name and kept in insertion order; replacing a layer
//! keeps its position. Every mutation marks the store dirty and redraws
//! the surface. The last composite is cached until the next mutation.

use std::collections::HashMap;

use tracing::{debug, warn};

use geoshift_core::{Error, Result};

use super::{ComparisonPair, Composite, CompositeImage, CompositeLayer, Layer, Overlay, RenderSurface};

/// Conventional name of the left comparison layer
pub const COMPARISON_LEFT: &str = "Image A";
/// Conventional name of the right comparison layer
pub const COMPARISON_RIGHT: &str = "Image B";

const LAYER_ZOOM: u8 = 10;
const WORLD_ZOOM: u8 = 2;

/// Coarse state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Empty,
    Single,
    Multi,
    Comparison,
}

pub struct LayerStore<S: RenderSurface> {
    layers: HashMap<String, Layer>,
    /// Insertion order
    order: Vec<String>,
    comparison: bool,
    pair: Option<(String, String)>,
    center: Option<(f64, f64)>,
    surface: S,
    dirty: bool,
    composite: Option<Composite>,
}

impl<S: RenderSurface> LayerStore<S> {
    pub fn new(surface: S) -> Self {
        Self {
            layers: HashMap::new(),
            order: Vec::new(),
            comparison: false,
            pair: None,
            center: None,
            surface,
            dirty: true,
            composite: None,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// Layers in insertion order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.order.iter().filter_map(|name| self.layers.get(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn is_comparison(&self) -> bool {
        self.comparison
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn state(&self) -> StoreState {
        match self.layers.len() {
            0 => StoreState::Empty,
            _ if self.comparison => StoreState::Comparison,
            1 => StoreState::Single,
            _ => StoreState::Multi,
        }
    }

    /// Insert a layer, or replace the one with the same name in place.
    pub fn add_layer(&mut self, layer: Layer) -> Result<()> {
        let name = layer.name.clone();
        if self.layers.insert(name.clone(), layer).is_none() {
            self.order.push(name.clone());
        }
        debug!("Layer '{}' added ({} total)", name, self.layers.len());
        self.refresh()
    }

    /// Remove a layer. Unknown names are logged and ignored.
    pub fn remove_layer(&mut self, name: &str) -> Result<bool> {
        if self.layers.remove(name).is_none() {
            warn!("Cannot remove unknown layer '{}'", name);
            return Ok(false);
        }
        self.order.retain(|n| n != name);
        self.refresh()?;
        Ok(true)
    }

    pub fn set_visibility(&mut self, name: &str, visible: bool) -> Result<()> {
        self.update(name, |layer| layer.visible = visible)
    }

    /// Set a layer's opacity, clamped to 0..=1.
    pub fn set_opacity(&mut self, name: &str, opacity: f32) -> Result<()> {
        self.update(name, |layer| layer.opacity = opacity.clamp(0.0, 1.0))
    }

    /// Attach, replace or (with `None`) remove a layer's overlay.
    pub fn set_overlay(&mut self, name: &str, overlay: Option<Overlay>) -> Result<()> {
        self.update(name, |layer| layer.overlay = overlay)
    }

    /// Show or hide a layer's overlay without dropping it.
    pub fn set_overlay_visibility(&mut self, name: &str, visible: bool) -> Result<()> {
        self.update(name, |layer| {
            if let Some(overlay) = layer.overlay.as_mut() {
                overlay.visible = visible;
            }
        })
    }

    /// Drop every layer and leave comparison mode.
    pub fn clear_all(&mut self) -> Result<()> {
        self.layers.clear();
        self.order.clear();
        self.comparison = false;
        self.pair = None;
        self.center = None;
        self.refresh()
    }

    /// Show exactly `left` and `right` side by side. The two names must
    /// differ; on error the store is left as it was.
    pub fn enter_comparison(&mut self, left: Layer, right: Layer) -> Result<()> {
        if left.name == right.name {
            return Err(Error::InvalidParameter {
                name: "comparison",
                value: left.name,
                reason: "left and right layers need distinct names".into(),
            });
        }
        self.layers.clear();
        self.order.clear();
        self.center = None;

        let pair = (left.name.clone(), right.name.clone());
        for layer in [left, right] {
            let layer = layer.with_visibility(true);
            let name = layer.name.clone();
            if self.layers.insert(name.clone(), layer).is_none() {
                self.order.push(name);
            }
        }
        self.comparison = true;
        self.pair = Some(pair);
        self.refresh()
    }

    /// Leave comparison mode, keeping the layers.
    pub fn exit_comparison(&mut self) -> Result<()> {
        self.comparison = false;
        self.pair = None;
        self.refresh()
    }

    /// Centre the view on a layer's bounds.
    pub fn zoom_to(&mut self, name: &str) -> Result<()> {
        let Some(layer) = self.layers.get(name) else {
            warn!("Cannot zoom to unknown layer '{}'", name);
            return Ok(());
        };
        let center = layer.bounds.center();
        self.center = Some(center);
        self.surface.recenter(center, LAYER_ZOOM)?;
        self.refresh()
    }

    /// The resolved comparison pair, if in comparison mode.
    ///
    /// Prefers the designated pair, then the conventional "Image A" and
    /// "Image B" layers, then the first two layers.
    pub fn comparison_pair(&self) -> Option<ComparisonPair> {
        if !self.comparison {
            return None;
        }
        let both = |l: &str, r: &str| self.layers.contains_key(l) && self.layers.contains_key(r);

        let (left, right) = match &self.pair {
            Some((l, r)) if both(l.as_str(), r.as_str()) => (l.clone(), r.clone()),
            _ if both(COMPARISON_LEFT, COMPARISON_RIGHT) => {
                (COMPARISON_LEFT.to_string(), COMPARISON_RIGHT.to_string())
            }
            _ if self.order.len() >= 2 => (self.order[0].clone(), self.order[1].clone()),
            _ => return None,
        };
        Some(ComparisonPair { left, right })
    }

    /// Build the composite for the current state without touching the cache.
    pub fn compose(&self) -> Composite {
        let layers: Vec<CompositeLayer> = self
            .layers()
            .filter(|layer| layer.visible)
            .map(|layer| CompositeLayer {
                name: layer.name.clone(),
                bounds: layer.bounds,
                base: CompositeImage {
                    image: layer.raster.preview.path().to_path_buf(),
                    opacity: layer.opacity,
                },
                overlay: layer
                    .overlay
                    .as_ref()
                    .filter(|o| o.visible)
                    .map(|o| CompositeImage {
                        image: o.artifact.path().to_path_buf(),
                        opacity: o.opacity,
                    }),
            })
            .collect();

        let center = self
            .center
            .or_else(|| layers.first().map(|l| l.bounds.center()))
            .unwrap_or((0.0, 0.0));
        let zoom = if self.layers.is_empty() { WORLD_ZOOM } else { LAYER_ZOOM };

        Composite {
            center,
            zoom,
            layers,
            comparison: self.comparison_pair(),
        }
    }

    /// The current composite, recomposing and redrawing only if dirty.
    pub fn composite(&mut self) -> Result<&Composite> {
        self.render()?;
        // `render` leaves a cached composite on success
        Ok(self.composite.get_or_insert_with(Composite::empty))
    }

    /// Redraw if anything changed since the last successful draw.
    pub fn render(&mut self) -> Result<()> {
        if !self.dirty && self.composite.is_some() {
            return Ok(());
        }
        let composite = self.compose();
        self.surface.display(&composite)?;
        self.composite = Some(composite);
        self.dirty = false;
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        self.dirty = true;
        self.render()
    }

    fn update<F: FnOnce(&mut Layer)>(&mut self, name: &str, apply: F) -> Result<()> {
        match self.layers.get_mut(name) {
            Some(layer) => {
                apply(layer);
                self.refresh()
            }
            None => {
                warn!("Unknown layer '{}'", name);
                Ok(())
            }
        }
    }
}

impl Composite {
    fn empty() -> Self {
        Composite {
            center: (0.0, 0.0),
            zoom: WORLD_ZOOM,
            layers: Vec::new(),
            comparison: None,
        }
    }
}
