//! A comparison session
//!
//! Owns the layer store, the two slot loaders and the analyzer. Background
//! work reports back over a channel; [`Session::poll`] and
//! [`Session::wait_until_idle`] apply those messages on the owner's thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use geoshift_algorithms::imagery::{DetectorInfo, DetectorRegistry};
use geoshift_core::{Error, Result};

use crate::analysis::{AnalysisInput, AnalysisOutcome, ChangeAnalyzer};
use crate::artifacts::{ArtifactHandle, ArtifactStore};
use crate::config::SessionConfig;
use crate::ingest::{RasterHandle, RasterIngestor};
use crate::layers::{Layer, LayerStore, Overlay, RenderSurface};
use crate::loader::{Slot, SlotLoader};
use crate::messages::{LogEntry, LogLevel, SessionMessage};

const SLOTS: [Slot; 2] = [Slot::A, Slot::B];

pub struct Session<S: RenderSurface> {
    config: SessionConfig,
    artifacts: Arc<ArtifactStore>,
    ingestor: Arc<RasterIngestor>,
    analyzer: Arc<ChangeAnalyzer>,
    layers: LayerStore<S>,
    slots: [Arc<SlotLoader>; 2],
    loaded: [Option<Arc<RasterHandle>>; 2],
    /// Last generation per slot that finished, loaded or failed
    settled: [u64; 2],
    analysis_running: bool,
    last_outcome: Option<AnalysisOutcome>,
    log: Vec<LogEntry>,
    tx: Sender<SessionMessage>,
    rx: Receiver<SessionMessage>,
}

impl<S: RenderSurface> Session<S> {
    /// Session with the built-in detectors, plus model entries if configured.
    pub fn new(config: SessionConfig, surface: S) -> Result<Self> {
        let registry = if config.model_hooks {
            DetectorRegistry::with_model_hooks()
        } else {
            DetectorRegistry::with_defaults()
        };
        Self::with_registry(config, surface, registry)
    }

    pub fn with_registry(config: SessionConfig, surface: S, registry: DetectorRegistry) -> Result<Self> {
        config.validate()?;
        let artifacts = Arc::new(ArtifactStore::new(&config.cache_dir)?);
        let ingestor = Arc::new(RasterIngestor::new(Arc::clone(&artifacts), &config));
        let analyzer = Arc::new(ChangeAnalyzer::new(
            Arc::new(registry),
            Arc::clone(&artifacts),
            config.overlay_alpha,
        ));

        let (tx, rx) = unbounded();
        let slot = |s: Slot| Arc::new(SlotLoader::new(s, Arc::clone(&ingestor), config.overview_target, tx.clone()));
        let slots = [slot(Slot::A), slot(Slot::B)];

        info!("Session {} started in {}", artifacts.session_id(), artifacts.dir().display());

        Ok(Self {
            config,
            artifacts,
            ingestor,
            analyzer,
            layers: LayerStore::new(surface),
            slots,
            loaded: [None, None],
            settled: [0, 0],
            analysis_running: false,
            last_outcome: None,
            log: Vec::new(),
            tx,
            rx,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn layers(&self) -> &LayerStore<S> {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerStore<S> {
        &mut self.layers
    }

    pub fn slot(&self, slot: Slot) -> &SlotLoader {
        &self.slots[slot.index()]
    }

    /// The raster currently loaded into `slot`.
    pub fn raster(&self, slot: Slot) -> Option<&Arc<RasterHandle>> {
        self.loaded[slot.index()].as_ref()
    }

    pub fn detectors(&self) -> Vec<DetectorInfo> {
        self.analyzer.registry().available()
    }

    pub fn last_outcome(&self) -> Option<&AnalysisOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn is_loading(&self, slot: Slot) -> bool {
        self.slots[slot.index()].generation() != self.settled[slot.index()]
    }

    pub fn is_analysis_running(&self) -> bool {
        self.analysis_running
    }

    pub fn is_idle(&self) -> bool {
        !self.analysis_running && SLOTS.iter().all(|&s| !self.is_loading(s))
    }

    /// Load a raster into a comparison slot in the background.
    ///
    /// A newer load into the same slot supersedes this one.
    pub fn load_slot(&mut self, slot: Slot, path: impl Into<PathBuf>) -> u64 {
        self.slots[slot.index()].load(path)
    }

    /// Load a raster synchronously and show it as a plain layer.
    pub fn add_raster(&mut self, name: &str, path: &Path) -> Result<Arc<RasterHandle>> {
        let raster = self.ingestor.ingest(path)?;
        self.layers.add_layer(Layer::new(name, Arc::clone(&raster)))?;
        self.layers.zoom_to(name)?;
        Ok(raster)
    }

    /// Apply every pending message without blocking. Returns how many.
    pub fn poll(&mut self) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.apply(msg);
            count += 1;
        }
        count
    }

    /// Apply messages until no load or analysis is in flight.
    ///
    /// Returns false if `timeout` ran out first.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(msg) => self.apply(msg),
                Err(RecvTimeoutError::Timeout) => return false,
                // The session holds a sender, so this cannot happen
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        self.poll();
        true
    }

    /// Apply one background message.
    pub fn apply(&mut self, msg: SessionMessage) {
        match msg {
            SessionMessage::SlotLoaded { slot, generation, raster } => {
                if !self.slots[slot.index()].is_current(generation) {
                    debug!("Discarding superseded load of {}", slot);
                    return;
                }
                self.settled[slot.index()] = generation;
                self.push_log(LogEntry::success(format!(
                    "{} loaded: {} ({}x{}, {} band(s))",
                    slot,
                    raster.file_name(),
                    raster.width(),
                    raster.height(),
                    raster.band_count()
                )));
                self.loaded[slot.index()] = Some(raster);
                self.last_outcome = None;
                if let Err(e) = self.show_slots() {
                    self.push_log(LogEntry::error(format!("Display failed: {}", e)));
                }
            }
            SessionMessage::SlotFailed { slot, generation, message } => {
                if !self.slots[slot.index()].is_current(generation) {
                    debug!("Discarding superseded failure of {}", slot);
                    return;
                }
                self.settled[slot.index()] = generation;
                self.loaded[slot.index()] = None;
                self.last_outcome = None;
                self.push_log(LogEntry::error(format!("Failed to load {}: {}", slot, message)));
                if let Err(e) = self.show_slots() {
                    self.push_log(LogEntry::error(format!("Display failed: {}", e)));
                }
            }
            SessionMessage::AnalysisComplete { outcome, elapsed } => {
                self.analysis_running = false;
                self.push_log(LogEntry::success(format!(
                    "{} analysis done in {:.2}s: {:.2}% changed",
                    outcome.detector(),
                    elapsed.as_secs_f64(),
                    outcome.percentage()
                )));
                if let Err(e) = self.show_outcome(*outcome) {
                    self.push_log(LogEntry::error(format!("Display failed: {}", e)));
                }
            }
            SessionMessage::AnalysisFailed { detector, message } => {
                self.analysis_running = false;
                self.push_log(LogEntry::error(format!("{} analysis failed: {}", detector, message)));
            }
            SessionMessage::Log(entry) => self.push_log(entry),
        }
    }

    /// Run a change analysis on the loaded pair and show its overlay.
    pub fn run_analysis(&mut self, detector: &str) -> Result<&AnalysisOutcome> {
        let (a, b) = self.ready_pair()?;
        let outcome = read_and_run(&self.analyzer, detector, [&*self.slots[0], &*self.slots[1]], a, b, self.config.export_mask)?;
        self.show_outcome(outcome)?;
        self.last_outcome
            .as_ref()
            .ok_or_else(|| Error::Other("analysis result was not kept".into()))
    }

    /// Run a change analysis on a background thread.
    pub fn spawn_analysis(&mut self, detector: &str) -> Result<()> {
        if self.analysis_running {
            return Err(Error::Other("an analysis is already running".into()));
        }
        let (a, b) = self.ready_pair()?;
        let analyzer = Arc::clone(&self.analyzer);
        let slots = [Arc::clone(&self.slots[0]), Arc::clone(&self.slots[1])];
        let export_mask = self.config.export_mask;
        let tx = self.tx.clone();
        let detector = detector.to_string();

        self.analysis_running = true;
        std::thread::spawn(move || {
            let start = Instant::now();
            let msg = match read_and_run(&analyzer, &detector, [&*slots[0], &*slots[1]], a, b, export_mask) {
                Ok(outcome) => SessionMessage::AnalysisComplete {
                    outcome: Box::new(outcome),
                    elapsed: start.elapsed(),
                },
                Err(e) => SessionMessage::AnalysisFailed {
                    detector,
                    message: e.to_string(),
                },
            };
            let _ = tx.send(msg);
        });
        Ok(())
    }

    /// Show or hide the change overlay on both comparison layers.
    pub fn toggle_change(&mut self, visible: bool) -> Result<()> {
        for slot in SLOTS {
            self.layers.set_overlay_visibility(slot.layer_name(), visible)?;
        }
        Ok(())
    }

    /// Write the report document of the last analysis.
    pub fn export_report(&self) -> Result<ArtifactHandle> {
        let outcome = self
            .last_outcome
            .as_ref()
            .ok_or_else(|| Error::Other("no analysis to report; run one first".into()))?;
        self.analyzer.write_report(outcome)
    }

    /// Close both slots and clear the map.
    pub fn close(&mut self) -> Result<()> {
        for (i, slot) in self.slots.iter().enumerate() {
            slot.close();
            self.settled[i] = slot.generation();
        }
        self.loaded = [None, None];
        self.last_outcome = None;
        self.layers.clear_all()
    }

    /// Both loaded rasters, once neither slot has a load in flight.
    fn ready_pair(&self) -> Result<(Arc<RasterHandle>, Arc<RasterHandle>)> {
        for slot in SLOTS {
            if self.is_loading(slot) {
                return Err(Error::Other(format!("{} is still loading", slot)));
            }
        }
        match (&self.loaded[0], &self.loaded[1]) {
            (Some(a), Some(b)) => Ok((Arc::clone(a), Arc::clone(b))),
            _ => Err(Error::Other("load both images before running an analysis".into())),
        }
    }

    /// Put the loaded slots on the map: side by side when both are loaded.
    fn show_slots(&mut self) -> Result<()> {
        match (&self.loaded[0], &self.loaded[1]) {
            (Some(a), Some(b)) => {
                let left = Layer::new(Slot::A.layer_name(), Arc::clone(a));
                let right = Layer::new(Slot::B.layer_name(), Arc::clone(b));
                self.layers.enter_comparison(left, right)?;
                self.layers.zoom_to(Slot::A.layer_name())
            }
            _ => {
                if self.layers.is_comparison() {
                    self.layers.exit_comparison()?;
                }
                for slot in SLOTS {
                    match &self.loaded[slot.index()] {
                        Some(raster) => {
                            self.layers.add_layer(Layer::new(slot.layer_name(), Arc::clone(raster)))?;
                            self.layers.zoom_to(slot.layer_name())?;
                        }
                        None => {
                            if self.layers.get(slot.layer_name()).is_some() {
                                self.layers.remove_layer(slot.layer_name())?;
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn show_outcome(&mut self, outcome: AnalysisOutcome) -> Result<()> {
        let shows = |slot: Slot, used: &Path| {
            self.loaded[slot.index()]
                .as_ref()
                .is_some_and(|r| r.preview.path() == used)
        };
        if !(shows(Slot::A, &outcome.report.preview_a) && shows(Slot::B, &outcome.report.preview_b)) {
            warn!("Discarding {} result for images no longer loaded", outcome.detector());
            return Ok(());
        }

        let overlay = Overlay::new(outcome.overlay.clone(), self.config.overlay_opacity);
        self.last_outcome = Some(outcome);
        for slot in SLOTS {
            self.layers.set_overlay(slot.layer_name(), Some(overlay.clone()))?;
        }
        Ok(())
    }

    fn push_log(&mut self, entry: LogEntry) {
        match entry.level {
            LogLevel::Error => error!("{}", entry.message),
            LogLevel::Warning => warn!("{}", entry.message),
            LogLevel::Info | LogLevel::Success => info!("{}", entry.message),
        }
        self.log.push(entry);
    }
}

fn read_and_run(
    analyzer: &ChangeAnalyzer,
    detector: &str,
    slots: [&SlotLoader; 2],
    a: Arc<RasterHandle>,
    b: Arc<RasterHandle>,
    export_mask: bool,
) -> Result<AnalysisOutcome> {
    // Fail on unknown keys before any full-resolution read
    analyzer.registry().get(detector)?;
    let (pixels_a, _) = slots[0].read_full()?;
    let (pixels_b, _) = slots[1].read_full()?;
    analyzer.run(
        detector,
        &AnalysisInput::new(a, pixels_a),
        &AnalysisInput::new(b, pixels_b),
        export_mask,
    )
}
