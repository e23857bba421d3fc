//! Stateful random-access reader with a fast overview
//!
//! A `WindowedReader` holds at most one open source. Opening a new path
//! releases the previous handle first, and `close` may be called any number
//! of times.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::{open_source, RasterSource, Window};
use crate::raster::{PixelBlock, RasterMetadata};

/// Default longest side of a synthesized overview.
pub const DEFAULT_OVERVIEW_TARGET: usize = 2048;

pub struct WindowedReader {
    source: Option<Box<dyn RasterSource>>,
    path: Option<PathBuf>,
    overview: Option<PixelBlock>,
    overview_target: usize,
}

impl Default for WindowedReader {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowedReader {
    pub fn new() -> Self {
        Self::with_overview_target(DEFAULT_OVERVIEW_TARGET)
    }

    /// Reader whose synthesized overviews aim for `target` pixels on the
    /// longest side.
    pub fn with_overview_target(target: usize) -> Self {
        Self {
            source: None,
            path: None,
            overview: None,
            overview_target: target.max(1),
        }
    }

    /// Open `path` and build its overview.
    ///
    /// Any previously opened raster is closed before the new one is touched.
    /// On failure the reader is left closed.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.close();

        let mut source = open_source(path)?;
        let overview = build_overview(&mut *source, self.overview_target)
            .map_err(|e| Error::raster_load(path, format!("cannot build overview: {}", e)))?;

        debug!(
            "WindowedReader opened {} (overview {}x{})",
            path.display(),
            overview.dim().1,
            overview.dim().0
        );
        self.source = Some(source);
        self.path = Some(path.to_path_buf());
        self.overview = Some(overview);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn metadata(&self) -> Option<&RasterMetadata> {
        self.source.as_ref().map(|s| s.metadata())
    }

    /// Low-resolution copy of the open raster in display band order.
    pub fn overview(&self) -> Option<&PixelBlock> {
        self.overview.as_ref()
    }

    /// Read exactly the requested full-resolution block in display band order.
    ///
    /// Returns `None` when nothing is open, the window is empty or leaves the
    /// raster, or decoding fails.
    pub fn read_window(&mut self, row_off: usize, col_off: usize, height: usize, width: usize) -> Option<PixelBlock> {
        let source = self.source.as_mut()?;
        let meta = source.metadata();
        let window = Window::new(row_off, col_off, height, width);
        if window.is_empty() || !window.fits(meta.height, meta.width) {
            debug!("Window {:?} outside {}x{} raster", window, meta.width, meta.height);
            return None;
        }

        let bands = display_bands(meta);
        match source.read_window(window, &bands) {
            Ok(block) => Some(block),
            Err(e) => {
                warn!("Window read failed: {}", e);
                None
            }
        }
    }

    /// Whole raster at full resolution in display band order.
    ///
    /// Used for change analysis, which must not work on previews.
    pub fn read_full(&mut self) -> Result<PixelBlock> {
        let source = self.source.as_mut().ok_or_else(not_open)?;
        let meta = source.metadata();
        let window = Window::full(meta.height, meta.width);
        let bands = display_bands(meta);
        source.read_window(window, &bands)
    }

    /// Nearest-neighbour read of the whole raster at `rows` x `cols`.
    pub fn read_decimated(&mut self, rows: usize, cols: usize) -> Result<PixelBlock> {
        let source = self.source.as_mut().ok_or_else(not_open)?;
        let bands = display_bands(source.metadata());
        source.read_decimated(rows, cols, &bands)
    }

    /// Release the open source, if any.
    pub fn close(&mut self) {
        if let Some(path) = self.path.take() {
            debug!("WindowedReader closed {}", path.display());
        }
        self.source = None;
        self.overview = None;
    }
}

fn not_open() -> Error {
    Error::Other("no raster is open".into())
}

/// First three bands of a multiband raster, otherwise every band.
fn display_bands(meta: &RasterMetadata) -> Vec<usize> {
    (0..meta.display_band_count()).collect()
}

/// Smallest built-in overview, or a decimated read with an integer factor of
/// `max(1, longest_side / target)`.
fn build_overview(source: &mut dyn RasterSource, target: usize) -> Result<PixelBlock> {
    let meta = source.metadata().clone();
    let bands = display_bands(&meta);

    let smallest = meta
        .overviews
        .iter()
        .enumerate()
        .min_by_key(|(_, size)| size.0 * size.1)
        .map(|(level, _)| level);

    if let Some(level) = smallest {
        match source.read_overview(level, &bands) {
            Ok(block) => return Ok(block),
            Err(e) => warn!("Built-in overview {} unreadable, decimating instead: {}", level, e),
        }
    }

    let factor = (meta.width.max(meta.height) / target).max(1);
    let rows = (meta.height / factor).max(1);
    let cols = (meta.width / factor).max(1);
    source.read_decimated(rows, cols, &bands)
}

impl Drop for WindowedReader {
    fn drop(&mut self) {
        self.close();
    }
}
