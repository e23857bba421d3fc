//! Render surfaces: where composites go

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use geoshift_core::{Error, Result};

use super::Composite;

/// Something that can show a composite.
pub trait RenderSurface {
    /// Draw `composite`, replacing whatever was shown before.
    fn display(&mut self, composite: &Composite) -> Result<()>;

    /// Move the view to `center` (x, y) at `zoom`.
    fn recenter(&mut self, center: (f64, f64), zoom: u8) -> Result<()>;
}

/// Keeps every frame in memory. Useful headless and in tests.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub frames: Vec<Composite>,
    pub views: Vec<((f64, f64), u8)>,
    fail_next: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `display` call fail.
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    pub fn last(&self) -> Option<&Composite> {
        self.frames.last()
    }
}

impl RenderSurface for RecordingSurface {
    fn display(&mut self, composite: &Composite) -> Result<()> {
        if std::mem::take(&mut self.fail_next) {
            return Err(Error::Render("surface unavailable".into()));
        }
        self.frames.push(composite.clone());
        Ok(())
    }

    fn recenter(&mut self, center: (f64, f64), zoom: u8) -> Result<()> {
        self.views.push((center, zoom));
        Ok(())
    }
}

/// Writes each composite as a JSON document for an external viewer.
#[derive(Debug, Clone)]
pub struct JsonFileSurface {
    path: PathBuf,
}

impl JsonFileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSurface for JsonFileSurface {
    fn display(&mut self, composite: &Composite) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(composite).map_err(|e| Error::Render(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Render(format!("{}: {}", self.path.display(), e)))?;
        debug!("Composite written to {}", self.path.display());
        Ok(())
    }

    fn recenter(&mut self, _center: (f64, f64), _zoom: u8) -> Result<()> {
        // The composite carries the view; nothing else to do.
        Ok(())
    }
}
