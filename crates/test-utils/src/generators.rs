//! Synthetic grid generators.
//!
//! The swath model itself lives in `geo_common::swath` so the round-trip
//! checker can share it; it is re-exported here for tests.

pub use geo_common::swath::{wrap_lon, SwathModel, TiePointData};

/// Creates a lat/lon grid with the given values on a regular lattice.
///
/// Latitudes decrease by `d_lat` per row starting at `lat0`, longitudes
/// increase by `d_lon` per column starting at `lon0` and are wrapped.
///
/// ```
/// use test_utils::create_regular_grids;
///
/// let (lat, lon) = create_regular_grids(3, 2, 10.0, 170.0, 1.0, 10.0);
/// assert_eq!(lat, vec![10.0, 10.0, 10.0, 9.0, 9.0, 9.0]);
/// assert_eq!(lon[2], -170.0);
/// ```
pub fn create_regular_grids(
    width: usize,
    height: usize,
    lat0: f64,
    lon0: f64,
    d_lat: f64,
    d_lon: f64,
) -> (Vec<f32>, Vec<f32>) {
    let mut lat = Vec::with_capacity(width * height);
    let mut lon = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            lat.push((lat0 - row as f64 * d_lat) as f32);
            lon.push(wrap_lon(lon0 + col as f64 * d_lon) as f32);
        }
    }
    (lat, lon)
}

