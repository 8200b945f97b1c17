//! Pixel and geographic positions.
//!
//! Both types use NaN components to mark an unknown position. Comparisons
//! involving NaN always fail, so an invalid position never equals anything,
//! including itself.

use serde::{Deserialize, Serialize};

/// A position in raster pixel space. `(0.0, 0.0)` is the upper-left corner of
/// the first pixel, `(0.5, 0.5)` its centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: f64,
    pub y: f64,
}

impl PixelPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// A position with both components NaN.
    pub fn invalid() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
        }
    }

    pub fn is_valid(&self) -> bool {
        !(self.x.is_nan() || self.y.is_nan())
    }
}

impl Default for PixelPos {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// A position with both components NaN.
    pub fn invalid() -> Self {
        Self {
            lat: f64::NAN,
            lon: f64::NAN,
        }
    }

    pub fn is_valid(&self) -> bool {
        !(self.lat.is_nan() || self.lon.is_nan())
    }

    /// Copy of this position with the longitude wrapped into [-180, 180].
    pub fn normalized(&self) -> Self {
        Self {
            lat: self.lat,
            lon: normalize_lon(self.lon),
        }
    }
}

impl Default for GeoPos {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Wrap a longitude into [-180, 180]. Values already inside the range are
/// returned unchanged, so +180 and -180 are both kept as given.
pub fn normalize_lon(lon: f64) -> f64 {
    if !lon.is_finite() || (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}
