//! # GeoShift Session
//!
//! Everything between raster files and a comparison view:
//!
//! - **config**: JSON session configuration
//! - **artifacts**: per-session directory of previews, overlays, masks and reports
//! - **ingest**: metadata, bounded previews and display bounds for a raster
//! - **layers**: ordered layer store, comparison mode and render surfaces
//! - **loader**: background loading into the A/B slots
//! - **analysis**: change detection, area statistics and report data
//! - **session**: the session tying these together
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use geoshift_session::{RecordingSurface, Session, SessionConfig, Slot};
//!
//! let mut session = Session::new(SessionConfig::default(), RecordingSurface::new())?;
//! session.load_slot(Slot::A, "before.tif");
//! session.load_slot(Slot::B, "after.tif");
//! session.wait_until_idle(Duration::from_secs(60));
//!
//! let outcome = session.run_analysis("landuse")?;
//! println!("{:.2}% changed", outcome.percentage());
//! # Ok::<(), geoshift_core::Error>(())
//! ```

pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod ingest;
pub mod layers;
pub mod loader;
pub mod messages;
mod session;

pub use analysis::{AnalysisInput, AnalysisOutcome, ChangeAnalyzer, ReportData};
pub use artifacts::{ArtifactHandle, ArtifactKind, ArtifactStore};
pub use config::SessionConfig;
pub use ingest::{RasterHandle, RasterIngestor};
pub use layers::{
    Composite, JsonFileSurface, Layer, LayerStore, Overlay, RecordingSurface, RenderSurface,
    StoreState,
};
pub use loader::{Slot, SlotLoader};
pub use messages::{LogEntry, LogLevel, SessionMessage};
pub use session::Session;
