//! Pure-Rust projected → WGS84 conversion for display bounds.
//!
//! Covers UTM (EPSG 326xx North, 327xx South) with the Snyder (1987)
//! inverse series, and spherical Web Mercator (EPSG 3857 / 900913).
//! Only bounding-box corners are transformed; pixel data never is.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::Bounds;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

// ── Public API ───────────────────────────────────────────────────────────

/// Reproject a bounding box to WGS84 longitude/latitude.
///
/// The four corners are converted and their envelope returned. Bounds
/// already in EPSG:4326 come back unchanged.
///
/// # Errors
/// [`Error::Reprojection`] for CRSs without an EPSG code, unsupported codes,
/// and results outside the valid longitude/latitude range.
pub fn bounds_to_wgs84(bounds: &Bounds, crs: &CRS) -> Result<Bounds> {
    let fail = |reason: &str| Error::Reprojection {
        from: crs.identifier(),
        reason: reason.to_string(),
    };

    let epsg = crs.epsg().ok_or_else(|| fail("no EPSG code"))?;
    if crs.is_wgs84() {
        return Ok(*bounds);
    }

    let project: Box<dyn Fn(f64, f64) -> (f64, f64)> = if let Some((zone, north)) = parse_utm_epsg(epsg) {
        Box::new(move |e, n| utm_to_wgs84(e, n, zone, north))
    } else if is_web_mercator(epsg) {
        Box::new(web_mercator_to_wgs84)
    } else {
        return Err(fail("unsupported CRS"));
    };

    let corners: Vec<(f64, f64)> = bounds.corners().iter().map(|&(x, y)| project(x, y)).collect();
    let out = Bounds::enclosing(&corners);

    let in_range = out.is_finite()
        && out.left >= -180.0
        && out.right <= 180.0
        && out.bottom >= -90.0
        && out.top <= 90.0;
    if !in_range {
        return Err(fail("corners fall outside longitude/latitude range"));
    }
    Ok(out)
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

pub fn is_web_mercator(epsg: u32) -> bool {
    matches!(epsg, 3857 | 900913 | 3785)
}

// ── Core projection (Snyder 1987, USGS Prof. Paper 1395, pp. 63-64) ─────

/// Convert UTM (easting, northing) in metres to WGS84 (longitude, latitude)
/// in degrees.
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    // Footpoint latitude (Snyder eq. 3-26, 7-19)
    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d2 * d2;
    let d5 = d4 * d;
    let d6 = d4 * d2;

    // Snyder eq. 8-17
    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    // Snyder eq. 8-18
    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Spherical Web Mercator (x, y) in metres to WGS84 degrees.
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / A).to_degrees();
    let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

// ── Tests ────────────────────────────────────────────────────────────────
