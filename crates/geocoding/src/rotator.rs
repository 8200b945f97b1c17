//! Rotation of geographic coordinates on the unit sphere.
//!
//! A [`Rotator`] moves an arbitrary centre point to `(lon, lat) = (0, 0)`.
//! Fitting polynomials in the rotated frame keeps the point cloud away from
//! the antimeridian and the poles, where longitude is discontinuous or
//! degenerate.

use geo_common::GeoPos;
use nalgebra::{Matrix3, Vector3};

/// Rotation taking a centre point to the origin of a new lon/lat frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotator {
    /// Rows are the new x, y and z axes expressed in the original frame.
    matrix: Matrix3<f64>,
}

impl Rotator {
    /// Rotation moving `(center_lon, center_lat)` to `(0, 0)`.
    pub fn new(center_lon: f64, center_lat: f64) -> Self {
        Self::with_alpha(center_lon, center_lat, 0.0)
    }

    /// Rotation moving the centre point to `(0, 0)`, followed by a rotation
    /// of `alpha` degrees about the axis through the new origin.
    pub fn with_alpha(center_lon: f64, center_lat: f64, alpha: f64) -> Self {
        let (su, cu) = center_lon.to_radians().sin_cos();
        let (sv, cv) = center_lat.to_radians().sin_cos();
        let (sw, cw) = alpha.to_radians().sin_cos();

        // x axis points at the centre
        let x = Vector3::new(cu * cv, su * cv, sv);
        // local east and north at the centre
        let east = Vector3::new(-su, cu, 0.0);
        let north = Vector3::new(-cu * sv, -su * sv, cv);

        let y = east * cw - north * sw;
        let z = east * sw + north * cw;

        Self {
            matrix: Matrix3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]),
        }
    }

    /// Rotation centred at a geographic position.
    pub fn from_point(center: GeoPos, alpha: f64) -> Self {
        Self::with_alpha(center.lon, center.lat, alpha)
    }

    /// Rotate `(lon, lat)` into the centred frame.
    pub fn transform(&self, lon: f64, lat: f64) -> (f64, f64) {
        to_lon_lat(&(self.matrix * to_unit_vector(lon, lat)))
    }

    /// Rotate `(lon, lat)` from the centred frame back to the original one.
    pub fn transform_inversely(&self, lon: f64, lat: f64) -> (f64, f64) {
        to_lon_lat(&(self.matrix.transpose() * to_unit_vector(lon, lat)))
    }

    /// Rotate parallel longitude/latitude arrays in place.
    pub fn transform_all(&self, lons: &mut [f64], lats: &mut [f64]) {
        for (lon, lat) in lons.iter_mut().zip(lats.iter_mut()) {
            (*lon, *lat) = self.transform(*lon, *lat);
        }
    }

    /// Inverse of [`Rotator::transform_all`].
    pub fn transform_all_inversely(&self, lons: &mut [f64], lats: &mut [f64]) {
        for (lon, lat) in lons.iter_mut().zip(lats.iter_mut()) {
            (*lon, *lat) = self.transform_inversely(*lon, *lat);
        }
    }

    /// Rotate a geographic position into the centred frame.
    pub fn transform_geo(&self, pos: GeoPos) -> GeoPos {
        let (lon, lat) = self.transform(pos.lon, pos.lat);
        GeoPos::new(lat, lon)
    }

    /// Rotate a geographic position back to the original frame.
    pub fn transform_geo_inversely(&self, pos: GeoPos) -> GeoPos {
        let (lon, lat) = self.transform_inversely(pos.lon, pos.lat);
        GeoPos::new(lat, lon)
    }
}

fn to_unit_vector(lon: f64, lat: f64) -> Vector3<f64> {
    let (su, cu) = lon.to_radians().sin_cos();
    let (sv, cv) = lat.to_radians().sin_cos();
    Vector3::new(cu * cv, su * cv, sv)
}

fn to_lon_lat(v: &Vector3<f64>) -> (f64, f64) {
    // atan2 instead of asin: asin loses half the digits near the poles
    let lat = v.z.atan2(v.x.hypot(v.y)).to_degrees();
    let lon = v.y.atan2(v.x).to_degrees();
    (lon, lat)
}
