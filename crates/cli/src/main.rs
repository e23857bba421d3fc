//! GeoShift CLI - raster comparison and change detection

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array2, Axis};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geoshift_algorithms::imagery::{
    compute_ndwi, threshold_water, DetectorRegistry, StatValue, DEFAULT_WATER_THRESHOLD,
};
use geoshift_algorithms::statistics::{
    calculate_area, calculate_change_area, classify_change_type, generate_change_map,
};
use geoshift_core::io::{open_source, write_geotiff_u8, write_mask_geotiff, GeoTiffOptions, Window};
use geoshift_core::reproject::bounds_to_wgs84;
use geoshift_core::RasterMetadata;
use geoshift_session::{JsonFileSurface, LogLevel, RecordingSurface, Session, SessionConfig, Slot};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geoshift")]
#[command(author, version, about = "Raster comparison and change detection", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Session configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for previews, overlays and reports
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Render a bounded-size preview PNG
    Preview {
        /// Input raster file
        input: PathBuf,
        /// Output PNG
        output: PathBuf,
        /// Longest side of the preview in pixels
        #[arg(short, long)]
        max_dimension: Option<usize>,
    },
    /// Detect change between a before and an after image
    Compare {
        /// Image A (before)
        before: PathBuf,
        /// Image B (after)
        after: PathBuf,
        /// Detector key, see `geoshift detectors`
        #[arg(short, long, default_value = "landuse")]
        detector: String,
        /// Also write the change mask as a GeoTIFF
        #[arg(long)]
        export_mask: bool,
        /// Write the report document
        #[arg(long)]
        report: bool,
        /// Write the final composite to this JSON file
        #[arg(long)]
        composite: Option<PathBuf>,
    },
    /// List available change detectors
    Detectors {
        /// Include model placeholders
        #[arg(long)]
        models: bool,
    },
    /// Water mask from NDWI
    Water {
        /// Multiband input raster
        input: PathBuf,
        /// Output mask GeoTIFF
        output: PathBuf,
        /// Green band (1-based)
        #[arg(long, default_value = "2")]
        green: usize,
        /// Near-infrared band (1-based)
        #[arg(long, default_value = "4")]
        nir: usize,
        /// NDWI threshold; water where NDWI is above it
        #[arg(short, long, default_value_t = DEFAULT_WATER_THRESHOLD)]
        threshold: f64,
    },
    /// Gain/loss map between two binary masks
    ChangeMap {
        /// Mask before
        before: PathBuf,
        /// Mask after
        after: PathBuf,
        /// Output RGB GeoTIFF
        output: PathBuf,
    },
    /// Write the effective configuration as JSON
    Config {
        /// Output file
        output: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    Ok(config)
}

/// Read one 1-based band of a raster at full resolution.
fn read_band(path: &Path, band: usize) -> Result<(Array2<f64>, RasterMetadata)> {
    let mut source = open_source(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let meta = source.metadata().clone();
    if band == 0 || band > meta.band_count {
        bail!("{} has {} band(s); band {} requested", path.display(), meta.band_count, band);
    }
    let block = source
        .read_window(Window::full(meta.height, meta.width), &[band - 1])
        .with_context(|| format!("Failed to read band {} of {}", band, path.display()))?;
    Ok((block.index_axis_move(Axis(2), 0), meta))
}

fn read_mask(path: &Path) -> Result<(Array2<u8>, RasterMetadata)> {
    let (band, meta) = read_band(path, 1)?;
    Ok((band.mapv(|v| u8::from(v.is_finite() && v != 0.0)), meta))
}

fn format_stat(value: &StatValue) -> String {
    match value {
        StatValue::Count(n) => n.to_string(),
        StatValue::Percentage(p) => format!("{:.2}%", p),
        StatValue::Label(s) => s.clone(),
    }
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info_command(input: &Path) -> Result<()> {
    let source = open_source(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let meta = source.metadata();
    let bounds = meta.bounds();
    let t = meta.transform;

    println!("File: {}", input.display());
    println!(
        "Dimensions: {} x {} ({} band(s), {})",
        meta.width, meta.height, meta.band_count, meta.sample_type
    );
    println!("Pixel size: {} x {}", t.pixel_width, t.pixel_height);
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.left, bounds.bottom, bounds.right, bounds.top
    );
    match &meta.crs {
        Some(crs) => {
            println!("CRS: {}", crs.identifier());
            if !crs.is_wgs84() {
                match bounds_to_wgs84(&bounds, crs) {
                    Ok(b) => println!(
                        "WGS84 bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                        b.left, b.bottom, b.right, b.top
                    ),
                    Err(e) => println!("WGS84 bounds: unavailable ({})", e),
                }
            }
        }
        None => println!("CRS: none"),
    }
    if let Some(nodata) = meta.nodata {
        println!("NoData: {}", nodata);
    }
    if !meta.overviews.is_empty() {
        let sizes: Vec<String> = meta.overviews.iter().map(|(w, h)| format!("{}x{}", w, h)).collect();
        println!("Overviews: {}", sizes.join(", "));
    }
    Ok(())
}

fn preview_command(config: SessionConfig, input: &Path, output: &Path, max_dimension: Option<usize>) -> Result<()> {
    let config = SessionConfig {
        max_preview_dimension: max_dimension.unwrap_or(config.max_preview_dimension),
        ..config
    };
    let mut session = Session::new(config, RecordingSurface::new()).context("Failed to start session")?;

    let pb = spinner("Rendering preview...");
    let start = Instant::now();
    let raster = session
        .add_raster("preview", input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    std::fs::copy(raster.preview.path(), output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    pb.finish_and_clear();

    let (w, h) = raster.preview_size;
    info!("Preview {}x{} of {}x{} raster", w, h, raster.width(), raster.height());
    session.artifacts().purge()?;
    done("Preview", output, start.elapsed());
    Ok(())
}

fn compare_command(
    config: SessionConfig,
    before: PathBuf,
    after: PathBuf,
    detector: &str,
    report: bool,
    composite: Option<PathBuf>,
) -> Result<()> {
    let surface = JsonFileSurface::new(
        composite
            .clone()
            .unwrap_or_else(|| config.cache_dir.join("composite.json")),
    );
    let mut session = Session::new(config, surface).context("Failed to start session")?;

    let pb = spinner("Loading images...");
    session.load_slot(Slot::A, before);
    session.load_slot(Slot::B, after);
    while !session.wait_until_idle(Duration::from_millis(200)) {}
    pb.finish_and_clear();

    if session.raster(Slot::A).is_none() || session.raster(Slot::B).is_none() {
        let reason = session
            .log()
            .iter()
            .rev()
            .find(|e| e.level == LogLevel::Error)
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "image not loaded".into());
        bail!(reason);
    }

    let pb = spinner("Detecting change...");
    let start = Instant::now();
    let outcome = session
        .run_analysis(detector)
        .with_context(|| format!("Change detection '{}' failed", detector))?;
    let elapsed = start.elapsed();
    pb.finish_and_clear();

    println!("{} vs {}", outcome.report.image_a, outcome.report.image_b);
    println!("Detector: {} ({})", outcome.report.detector_name, outcome.report.method);
    if let Some((rows, cols)) = outcome.resized_to {
        println!("Resized to: {} x {}", cols, rows);
    }
    for (key, value) in &outcome.report.statistics {
        println!("  {}: {}", key, format_stat(value));
    }
    println!(
        "  Changed area: {:.2} m² ({:.4} ha)",
        outcome.area.area_m2, outcome.area.area_ha
    );
    println!("Overlay: {}", outcome.overlay.path().display());
    if let Some(mask) = &outcome.mask_export {
        println!("Mask: {}", mask.path().display());
    }

    if report {
        let handle = session.export_report().context("Failed to write report")?;
        println!("Report: {}", handle.path().display());
    }
    if let Some(path) = composite {
        println!("Composite: {}", path.display());
    }
    println!("  Processing time: {:.2?}", elapsed);
    Ok(())
}

fn detectors_command(models: bool) {
    let registry = if models {
        DetectorRegistry::with_model_hooks()
    } else {
        DetectorRegistry::with_defaults()
    };
    for info in registry.available() {
        println!("{:<20} {:<10} {}", info.key, info.method, info.description);
    }
}

fn water_command(input: &Path, output: &Path, green: usize, nir: usize, threshold: f64) -> Result<()> {
    let pb = spinner("Reading bands...");
    let (green_band, meta) = read_band(input, green)?;
    let (nir_band, _) = read_band(input, nir)?;
    pb.finish_and_clear();

    let start = Instant::now();
    let ndwi = compute_ndwi(&green_band, &nir_band).context("Failed to compute NDWI")?;
    let water = threshold_water(&ndwi, threshold);
    let area = calculate_area(&water, meta.transform.pixel_width, meta.transform.pixel_height);
    let elapsed = start.elapsed();

    write_mask_geotiff(output, &water.mapv(|v| v * 255), meta.transform, meta.crs.clone())
        .context("Failed to write output")?;

    println!(
        "Water: {} of {} pixels ({:.2}%), {:.2} ha",
        area.true_pixels, area.total_pixels, area.percent_coverage, area.area_ha
    );
    done("Water mask", output, elapsed);
    Ok(())
}

fn change_map_command(before: &Path, after: &Path, output: &Path) -> Result<()> {
    let (mask_a, meta) = read_mask(before)?;
    let (mask_b, _) = read_mask(after)?;

    let start = Instant::now();
    let t = meta.transform;
    let change = calculate_change_area(&mask_a, &mask_b, t.pixel_width, t.pixel_height)
        .context("Masks must share a grid")?;
    let map = generate_change_map(&mask_a, &mask_b)?;
    let diff = ndarray::Zip::from(&mask_a)
        .and(&mask_b)
        .map_collect(|&a, &b| u8::from(a != b));
    let magnitude = classify_change_type(&diff);
    let elapsed = start.elapsed();

    write_geotiff_u8(output, &map, &GeoTiffOptions::georeferenced(t, meta.crs.clone()))
        .context("Failed to write output")?;

    println!(
        "Before: {:.2} ha, after: {:.2} ha",
        change.before.area_ha, change.after.area_ha
    );
    println!(
        "Change: {} of {:.2} ha ({:.2}%), {}",
        change.change_type, change.change_area_ha, change.change_percentage, magnitude
    );
    done("Change map", output, elapsed);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Info { input } => info_command(&input)?,
        Commands::Preview {
            input,
            output,
            max_dimension,
        } => preview_command(config, &input, &output, max_dimension)?,
        Commands::Compare {
            before,
            after,
            detector,
            export_mask,
            report,
            composite,
        } => {
            let config = SessionConfig {
                export_mask: export_mask || config.export_mask,
                ..config
            };
            compare_command(config, before, after, &detector, report, composite)?
        }
        Commands::Detectors { models } => detectors_command(models || config.model_hooks),
        Commands::Water {
            input,
            output,
            green,
            nir,
            threshold,
        } => water_command(&input, &output, green, nir, threshold)?,
        Commands::ChangeMap {
            before,
            after,
            output,
        } => change_map_command(&before, &after, &output)?,
        Commands::Config { output } => {
            config.save(&output).context("Failed to write config")?;
            println!("Configuration saved to: {}", output.display());
        }
    }

    Ok(())
}
