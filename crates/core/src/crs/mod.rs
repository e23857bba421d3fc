//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code of WGS84 longitude/latitude, the display CRS.
pub const WGS84_EPSG: u32 = 4326;

/// Coordinate Reference System representation
///
/// GeoTIFF files only reliably carry an EPSG code in their GeoKeyDirectory,
/// so that is all we keep. A citation string is retained when present for
/// display in metadata listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// Free-form citation (GTCitationGeoKey / GeoAsciiParams)
    citation: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            citation: None,
        }
    }

    /// Create a CRS known only by its citation text
    pub fn from_citation(citation: impl Into<String>) -> Self {
        Self {
            epsg: None,
            citation: Some(citation.into()),
        }
    }

    /// Attach a citation to an existing CRS
    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(WGS84_EPSG)
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn citation(&self) -> Option<&str> {
        self.citation.as_deref()
    }

    /// True for the canonical longitude/latitude system used for display.
    pub fn is_wgs84(&self) -> bool {
        self.epsg == Some(WGS84_EPSG)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.citation, &other.citation) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(citation) = &self.citation {
            return citation.clone();
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(32630);
        assert_eq!(crs.epsg(), Some(32630));
        assert_eq!(crs.identifier(), "EPSG:32630");
        assert!(!crs.is_wgs84());
    }

    #[test]
    fn test_crs_equivalence() {
        let a = CRS::from_epsg(4326).with_citation("WGS 84");
        let b = CRS::wgs84();
        assert!(a.is_equivalent(&b));
        assert!(b.is_wgs84());
    }

    #[test]
    fn test_citation_only_identifier() {
        let crs = CRS::from_citation("Local grid");
        assert_eq!(crs.to_string(), "Local grid");
        assert!(!crs.is_equivalent(&CRS::wgs84()));
    }
}
