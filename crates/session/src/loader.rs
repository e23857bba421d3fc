//! Background loading into the A/B comparison slots
//!
//! Each slot owns a [`WindowedReader`] behind a mutex and a generation
//! counter. Starting a load bumps the generation; a load thread holds the
//! reader lock for its whole run, so loads into one slot never overlap,
//! and results from superseded generations are dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use geoshift_core::{Error, PixelBlock, RasterMetadata, Result, WindowedReader};

use crate::ingest::RasterIngestor;
use crate::layers::{COMPARISON_LEFT, COMPARISON_RIGHT};
use crate::messages::{LogEntry, SessionMessage};

/// Comparison slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn index(&self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    /// Layer name used for this slot in comparison mode.
    pub fn layer_name(&self) -> &'static str {
        match self {
            Slot::A => COMPARISON_LEFT,
            Slot::B => COMPARISON_RIGHT,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layer_name())
    }
}

pub struct SlotLoader {
    slot: Slot,
    generation: Arc<AtomicU64>,
    reader: Arc<Mutex<WindowedReader>>,
    ingestor: Arc<RasterIngestor>,
    tx: Sender<SessionMessage>,
}

impl SlotLoader {
    pub fn new(slot: Slot, ingestor: Arc<RasterIngestor>, overview_target: usize, tx: Sender<SessionMessage>) -> Self {
        Self {
            slot,
            generation: Arc::new(AtomicU64::new(0)),
            reader: Arc::new(Mutex::new(WindowedReader::with_overview_target(overview_target))),
            ingestor,
            tx,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Generation of the most recently started load.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Start loading `path` on a background thread; returns its generation.
    ///
    /// The slot's previous reader is closed before the new path is opened.
    pub fn load(&self, path: impl Into<PathBuf>) -> u64 {
        let path = path.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = self.slot;
        let current = Arc::clone(&self.generation);
        let reader = Arc::clone(&self.reader);
        let ingestor = Arc::clone(&self.ingestor);
        let tx = self.tx.clone();

        std::thread::spawn(move || {
            let mut reader = reader.lock();
            if current.load(Ordering::SeqCst) != generation {
                debug!("{} load of {} superseded before start", slot, path.display());
                return;
            }

            let _ = tx.send(SessionMessage::Log(LogEntry::info(format!(
                "Loading {}: {}...",
                slot,
                path.display()
            ))));

            reader.close();
            let result = reader
                .open(&path)
                .and_then(|_| ingestor.ingest(&path));

            if current.load(Ordering::SeqCst) != generation {
                debug!("{} load of {} superseded, discarding", slot, path.display());
                return;
            }

            let msg = match result {
                Ok(raster) => SessionMessage::SlotLoaded { slot, generation, raster },
                Err(e) => {
                    reader.close();
                    SessionMessage::SlotFailed {
                        slot,
                        generation,
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(msg);
        });

        generation
    }

    /// Path of the open raster, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.reader.lock().path().map(Path::to_path_buf)
    }

    pub fn metadata(&self) -> Option<RasterMetadata> {
        self.reader.lock().metadata().cloned()
    }

    /// Full-resolution pixels of the open raster.
    pub fn read_full(&self) -> Result<(PixelBlock, RasterMetadata)> {
        let mut reader = self.reader.lock();
        let metadata = reader
            .metadata()
            .cloned()
            .ok_or_else(|| Error::Other(format!("{} has no raster loaded", self.slot)))?;
        Ok((reader.read_full()?, metadata))
    }

    /// A full-resolution window of the open raster.
    pub fn read_window(&self, row_off: usize, col_off: usize, height: usize, width: usize) -> Option<PixelBlock> {
        self.reader.lock().read_window(row_off, col_off, height, width)
    }

    /// Overview of the open raster.
    pub fn overview(&self) -> Option<PixelBlock> {
        self.reader.lock().overview().cloned()
    }

    /// Close the slot's reader and invalidate any in-flight load.
    pub fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.reader.lock().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names() {
        assert_eq!(Slot::A.layer_name(), "Image A");
        assert_eq!(Slot::B.to_string(), "Image B");
        assert_eq!(Slot::B.index(), 1);
    }
}
