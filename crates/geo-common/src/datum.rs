//! Reference ellipsoid and geodetic datum.
//!
//! Only the WGS-84 referenced abstraction is modelled; there is no datum
//! shift machinery.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// A reference ellipsoid, identified by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ellipsoid {
    name: String,
    /// Semi-major (equatorial) axis in meters
    semi_major: f64,
    /// Semi-minor (polar) axis in meters
    semi_minor: f64,
}

impl Ellipsoid {
    pub fn new(name: impl Into<String>, semi_major: f64, semi_minor: f64) -> Self {
        Self {
            name: name.into(),
            semi_major,
            semi_minor,
        }
    }

    /// The WGS-84 ellipsoid.
    pub fn wgs84() -> Self {
        Self::new("WGS-84", 6378137.0, 6356752.3142)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semi_major(&self) -> f64 {
        self.semi_major
    }

    pub fn semi_minor(&self) -> f64 {
        self.semi_minor
    }

    /// Flattening `(a - b) / a`.
    pub fn flattening(&self) -> f64 {
        (self.semi_major - self.semi_minor) / self.semi_major
    }

    /// First eccentricity squared `1 - b²/a²`.
    pub fn eccentricity_squared(&self) -> f64 {
        1.0 - (self.semi_minor / self.semi_major).powi(2)
    }
}

impl PartialEq for Ellipsoid {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Ellipsoid {}

/// A geodetic datum: a named ellipsoid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datum {
    name: String,
    ellipsoid: Ellipsoid,
}

impl Datum {
    pub fn new(name: impl Into<String>, ellipsoid: Ellipsoid) -> Self {
        Self {
            name: name.into(),
            ellipsoid,
        }
    }

    /// Shared WGS-84 datum instance.
    pub fn wgs84() -> Arc<Datum> {
        static WGS84: OnceLock<Arc<Datum>> = OnceLock::new();
        WGS84
            .get_or_init(|| Arc::new(Datum::new("WGS84", Ellipsoid::wgs84())))
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Datum {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wgs84_is_shared() {
        let a = Datum::wgs84();
        let b = Datum::wgs84();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.ellipsoid().semi_major(), 6378137.0);
    }

    #[test]
    fn test_equality_by_name() {
        let custom = Datum::new("WGS84", Ellipsoid::new("other", 1.0, 1.0));
        assert_eq!(*Datum::wgs84(), custom);
        assert_ne!(*Datum::wgs84(), Datum::new("ED50", Ellipsoid::wgs84()));
    }

    #[test]
    fn test_wgs84_flattening() {
        let f = Ellipsoid::wgs84().flattening();
        assert!((1.0 / f - 298.257).abs() < 0.01, "inverse flattening was {}", 1.0 / f);
        assert!(Ellipsoid::wgs84().eccentricity_squared() > 0.0066);
    }
}
