//! Analytic swath geometry.
//!
//! A [`SwathModel`] is a smooth, slightly tilted and curved mapping from
//! pixel to geographic coordinates, similar to the geometry of a push-broom
//! instrument. It is sampled into tie-point grids or ground control points
//! and geocodings built from those are checked against the model.

/// Analytic pixel -> (lat, lon) mapping over a `width` x `height` raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwathModel {
    pub width: usize,
    pub height: usize,
    pub center_lat: f64,
    pub center_lon: f64,
    /// Latitude covered from the first to the last line (decreasing).
    pub lat_span: f64,
    /// Longitude covered across the swath at the centre latitude.
    pub lon_span: f64,
    /// Across-track latitude change, the swath heading offset.
    pub tilt: f64,
}

impl SwathModel {
    /// A mid-latitude swath similar to a reduced-resolution ocean colour
    /// product.
    pub fn meris_like() -> Self {
        Self {
            width: 513,
            height: 1025,
            center_lat: 48.0,
            center_lon: 12.0,
            lat_span: 14.0,
            lon_span: 18.0,
            tilt: 2.5,
        }
    }

    /// A swath whose centre column runs along the antimeridian.
    pub fn antimeridian() -> Self {
        Self {
            width: 257,
            height: 513,
            center_lat: -20.0,
            center_lon: 179.0,
            lat_span: 10.0,
            lon_span: 12.0,
            tilt: 1.5,
        }
    }

    /// A swath with the given size and centre and the default geometry of
    /// the round-trip checker.
    pub fn centred(width: usize, height: usize, center_lat: f64, center_lon: f64) -> Self {
        Self {
            width,
            height,
            center_lat,
            center_lon,
            lat_span: 15.0,
            lon_span: 20.0,
            tilt: 3.0,
        }
    }

    /// A small swath, handy for quick exhaustive checks.
    pub fn small() -> Self {
        Self {
            width: 65,
            height: 97,
            center_lat: 35.0,
            center_lon: -40.0,
            lat_span: 3.0,
            lon_span: 3.0,
            tilt: 0.4,
        }
    }

    /// Geographic position of a pixel as `(lat, lon)`, longitude in
    /// `[-180, 180)`.
    pub fn geo_at(&self, x: f64, y: f64) -> (f64, f64) {
        let u = (x - self.width as f64 / 2.0) / self.width as f64;
        let v = (y - self.height as f64 / 2.0) / self.height as f64;
        let lat = self.center_lat - v * self.lat_span + u * self.tilt + 0.5 * u * u;
        let lon = self.center_lon + u * self.lon_span / lat.to_radians().cos() + v * self.tilt;
        (lat, wrap_lon(lon))
    }

    /// Sample the model into lat/lon tie-point grids, one tie point every
    /// `sub_sampling` pixels starting at the first pixel centre.
    pub fn tie_points(&self, sub_sampling: usize) -> TiePointData {
        let sub_sampling = sub_sampling.max(1);
        let grid_width = self.width.saturating_sub(1).div_ceil(sub_sampling) + 1;
        let grid_height = self.height.saturating_sub(1).div_ceil(sub_sampling) + 1;
        let mut lat = Vec::with_capacity(grid_width * grid_height);
        let mut lon = Vec::with_capacity(grid_width * grid_height);
        for j in 0..grid_height {
            for i in 0..grid_width {
                let x = 0.5 + (i * sub_sampling) as f64;
                let y = 0.5 + (j * sub_sampling) as f64;
                let (la, lo) = self.geo_at(x, y);
                lat.push(la as f32);
                lon.push(lo as f32);
            }
        }
        TiePointData {
            grid_width,
            grid_height,
            offset_x: 0.5,
            offset_y: 0.5,
            sub_sampling_x: sub_sampling as f64,
            sub_sampling_y: sub_sampling as f64,
            raster_width: self.width,
            raster_height: self.height,
            lat,
            lon,
        }
    }

    /// Ground control points on an `nx` x `ny` lattice of pixel centres
    /// spanning the raster, as `[x, y, lat, lon]`.
    pub fn gcps(&self, nx: usize, ny: usize) -> Vec<[f64; 4]> {
        let nx = nx.max(2);
        let ny = ny.max(2);
        let mut points = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let x = 0.5 + i as f64 * (self.width as f64 - 1.0) / (nx - 1) as f64;
                let y = 0.5 + j as f64 * (self.height as f64 - 1.0) / (ny - 1) as f64;
                let (lat, lon) = self.geo_at(x, y);
                points.push([x, y, lat, lon]);
            }
        }
        points
    }
}

/// Tie-point grids sampled from a [`SwathModel`], row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TiePointData {
    pub grid_width: usize,
    pub grid_height: usize,
    pub offset_x: f64,
    pub offset_y: f64,
    pub sub_sampling_x: f64,
    pub sub_sampling_y: f64,
    pub raster_width: usize,
    pub raster_height: usize,
    pub lat: Vec<f32>,
    pub lon: Vec<f32>,
}

/// Wrap a longitude into `[-180, 180)`.
pub fn wrap_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_lon() {
        assert_eq!(wrap_lon(190.0), -170.0);
        assert_eq!(wrap_lon(-190.0), 170.0);
        assert_eq!(wrap_lon(12.5), 12.5);
        assert_eq!(wrap_lon(180.0), -180.0);
    }

    #[test]
    fn test_tie_points_cover_raster() {
        let model = SwathModel::meris_like();
        let data = model.tie_points(16);
        assert_eq!(data.grid_width, 33);
        assert_eq!(data.grid_height, 65);
        assert_eq!(data.lat.len(), 33 * 65);
        assert_eq!(data.lon.len(), data.lat.len());
    }

    #[test]
    fn test_antimeridian_model_crosses() {
        let model = SwathModel::antimeridian();
        let (_, west) = model.geo_at(0.5, 256.0);
        let (_, east) = model.geo_at(256.5, 256.0);
        assert!(west > 0.0);
        assert!(east < 0.0);
    }

    #[test]
    fn test_gcps_span_corners() {
        let model = SwathModel::small();
        let gcps = model.gcps(3, 4);
        assert_eq!(gcps.len(), 12);
        assert_eq!(gcps[0][0], 0.5);
        assert_eq!(gcps[11][0], 64.5);
        assert_eq!(gcps[11][1], 96.5);
    }

    #[test]
    fn test_centred_keeps_size_and_centre() {
        let model = SwathModel::centred(1121, 2241, 52.0, 8.0);
        let (lat, lon) = model.geo_at(560.5, 1120.5);
        assert!((lat - 52.0).abs() < 1e-2);
        assert!((lon - 8.0).abs() < 1e-2);
        assert_eq!(model.tie_points(16).grid_width, 71);
    }
}
