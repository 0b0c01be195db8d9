//! Sky positions in the ICRS frame.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur when constructing a sky position
#[derive(Error, Debug, PartialEq)]
pub enum CoordError {
    #[error("Coordinates are not finite: ra {0}, dec {1}")]
    NonFinite(f64, f64),

    #[error("Coordinates out of range: ra {0} (expected 0..=360), dec {1} (expected -90..=90)")]
    OutOfRange(f64, f64),
}

/// Right ascension and declination in degrees, ICRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IcrsCoord {
    ra_deg: f64,
    dec_deg: f64,
}

impl IcrsCoord {
    /// Create a position from degrees.
    ///
    /// Values are taken as published; nothing is wrapped or clamped.
    pub fn new(ra_deg: f64, dec_deg: f64) -> Result<Self, CoordError> {
        if !ra_deg.is_finite() || !dec_deg.is_finite() {
            return Err(CoordError::NonFinite(ra_deg, dec_deg));
        }
        if !(0.0..=360.0).contains(&ra_deg) || !(-90.0..=90.0).contains(&dec_deg) {
            return Err(CoordError::OutOfRange(ra_deg, dec_deg));
        }
        Ok(Self { ra_deg, dec_deg })
    }

    /// Right ascension in degrees
    pub fn ra(&self) -> f64 {
        self.ra_deg
    }

    /// Declination in degrees
    pub fn dec(&self) -> f64 {
        self.dec_deg
    }
}

/// Sky anchor of a cluster.
///
/// Holds one position per parameter-table row published for the cluster.
/// Usually that is exactly one, but duplicated or missing upstream rows give
/// zero or several positions, which are kept as-is rather than averaged.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct CoordinateAnchor {
    coords: Vec<IcrsCoord>,
}

impl CoordinateAnchor {
    pub fn new(coords: Vec<IcrsCoord>) -> Self {
        Self { coords }
    }

    pub fn coords(&self) -> &[IcrsCoord] {
        &self.coords
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// True when the anchor is a single position
    pub fn is_single(&self) -> bool {
        self.coords.len() == 1
    }

    /// The single position, if the anchor has exactly one
    pub fn single(&self) -> Option<IcrsCoord> {
        match self.coords.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}
