//! Sparse tie-point grids and bilinear cell lookup.

use geo_common::position::normalize_lon;
use geo_common::{GeoCodingError, Result, TiePointData};
use serde::{Deserialize, Serialize};

/// How successive grid values relate across the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Discontinuity {
    /// Values are continuous.
    #[default]
    None,
    /// Values are longitudes that may wrap at ±180°.
    At180,
}

/// Value lookup at arbitrary raster positions.
pub trait GridSampler {
    fn raster_width(&self) -> usize;
    fn raster_height(&self) -> usize;

    /// Value at raster pixel coordinate `(x, y)`.
    fn sample(&self, x: f64, y: f64) -> f64;
}

/// A regularly strided grid of samples covering a raster.
///
/// Grid point `(i, j)` sits at raster position
/// `(offset_x + i * sub_sampling_x, offset_y + j * sub_sampling_y)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiePointGrid {
    name: String,
    grid_width: usize,
    grid_height: usize,
    offset_x: f64,
    offset_y: f64,
    sub_sampling_x: f64,
    sub_sampling_y: f64,
    values: Vec<f32>,
    discontinuity: Discontinuity,
    raster_width: usize,
    raster_height: usize,
}

impl TiePointGrid {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        grid_width: usize,
        grid_height: usize,
        offset_x: f64,
        offset_y: f64,
        sub_sampling_x: f64,
        sub_sampling_y: f64,
        values: Vec<f32>,
    ) -> Result<Self> {
        let name = name.into();
        if grid_width < 2 || grid_height < 2 {
            return Err(GeoCodingError::configuration(format!(
                "tie-point grid '{}' must be at least 2x2, got {}x{}",
                name, grid_width, grid_height
            )));
        }
        if values.len() != grid_width * grid_height {
            return Err(GeoCodingError::configuration(format!(
                "tie-point grid '{}' has {} values, expected {}",
                name,
                values.len(),
                grid_width * grid_height
            )));
        }
        if !(sub_sampling_x > 0.0 && sub_sampling_y > 0.0)
            || !sub_sampling_x.is_finite()
            || !sub_sampling_y.is_finite()
        {
            return Err(GeoCodingError::invalid_parameter(
                "sub_sampling",
                format!("tie-point grid '{}' needs positive sub-sampling", name),
            ));
        }
        if !(offset_x.is_finite() && offset_y.is_finite()) {
            return Err(GeoCodingError::invalid_parameter(
                "offset",
                format!("tie-point grid '{}' has a non-finite offset", name),
            ));
        }

        let raster_width = default_raster_extent(offset_x, sub_sampling_x, grid_width);
        let raster_height = default_raster_extent(offset_y, sub_sampling_y, grid_height);

        Ok(Self {
            name,
            grid_width,
            grid_height,
            offset_x,
            offset_y,
            sub_sampling_x,
            sub_sampling_y,
            values,
            discontinuity: Discontinuity::None,
            raster_width,
            raster_height,
        })
    }

    pub fn with_discontinuity(mut self, discontinuity: Discontinuity) -> Self {
        self.discontinuity = discontinuity;
        self
    }

    /// Latitude and longitude grids from sampled swath data. The longitude
    /// grid wraps at 180 degrees.
    pub fn lat_lon_from(data: &TiePointData) -> Result<(Self, Self)> {
        let grid = |name: &str, values: &[f32]| {
            TiePointGrid::new(
                name,
                data.grid_width,
                data.grid_height,
                data.offset_x,
                data.offset_y,
                data.sub_sampling_x,
                data.sub_sampling_y,
                values.to_vec(),
            )
            .map(|g| g.with_raster_size(data.raster_width, data.raster_height))
        };
        let lat = grid("latitude", &data.lat)?;
        let lon = grid("longitude", &data.lon)?.with_discontinuity(Discontinuity::At180);
        Ok((lat, lon))
    }

    /// Override the size of the raster the grid covers.
    pub fn with_raster_size(mut self, width: usize, height: usize) -> Self {
        self.raster_width = width;
        self.raster_height = height;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    pub fn offset_x(&self) -> f64 {
        self.offset_x
    }

    pub fn offset_y(&self) -> f64 {
        self.offset_y
    }

    pub fn sub_sampling_x(&self) -> f64 {
        self.sub_sampling_x
    }

    pub fn sub_sampling_y(&self) -> f64 {
        self.sub_sampling_y
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn discontinuity(&self) -> Discontinuity {
        self.discontinuity
    }

    /// Value of grid point `(i, j)`.
    pub fn value(&self, i: usize, j: usize) -> f32 {
        self.values[j * self.grid_width + i]
    }

    /// Convert a raster position into fractional grid indices.
    pub fn grid_index(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.offset_x) / self.sub_sampling_x,
            (y - self.offset_y) / self.sub_sampling_y,
        )
    }

    /// Convert fractional grid indices into a raster position.
    pub fn raster_position(&self, fi: f64, fj: f64) -> (f64, f64) {
        (
            self.offset_x + fi * self.sub_sampling_x,
            self.offset_y + fj * self.sub_sampling_y,
        )
    }

    /// Bilinear interpolation at fractional grid indices.
    ///
    /// Indices outside the grid are extrapolated linearly from the edge cell.
    /// With [`Discontinuity::At180`] the cell corners are unwrapped relative
    /// to the first corner and the result is wrapped back to [-180, 180].
    pub fn interpolate(&self, fi: f64, fj: f64) -> f64 {
        let Some(cell) = Cell::locate(self.grid_width, self.grid_height, fi, fj) else {
            return f64::NAN;
        };
        let mut corners = cell.corners(|i, j| self.value(i, j) as f64);
        match self.discontinuity {
            Discontinuity::None => cell.interpolate(corners),
            Discontinuity::At180 => {
                let first = corners[0];
                for corner in corners.iter_mut().skip(1) {
                    *corner = unwrap_towards(*corner, first);
                }
                normalize_lon(cell.interpolate(corners))
            }
        }
    }
}

impl GridSampler for TiePointGrid {
    fn raster_width(&self) -> usize {
        self.raster_width
    }

    fn raster_height(&self) -> usize {
        self.raster_height
    }

    fn sample(&self, x: f64, y: f64) -> f64 {
        let (fi, fj) = self.grid_index(x, y);
        self.interpolate(fi, fj)
    }
}

fn default_raster_extent(offset: f64, sub_sampling: f64, n: usize) -> usize {
    let extent = (offset + (n - 1) as f64 * sub_sampling + 0.5).ceil();
    if extent > 0.0 {
        extent as usize
    } else {
        0
    }
}

/// Shift `value` by a multiple of 360 so it lies within 180 of `reference`.
pub(crate) fn unwrap_towards(value: f64, reference: f64) -> f64 {
    let delta = value - reference;
    if delta > 180.0 {
        value - 360.0
    } else if delta < -180.0 {
        value + 360.0
    } else {
        value
    }
}

/// Location of a point inside a grid cell.
///
/// The cell index is clamped to the grid so points beyond the edges resolve to
/// the edge cell with weights outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cell {
    pub i0: usize,
    pub j0: usize,
    pub wi: f64,
    pub wj: f64,
}

impl Cell {
    pub fn locate(width: usize, height: usize, fi: f64, fj: f64) -> Option<Cell> {
        if !(fi.is_finite() && fj.is_finite()) || width < 2 || height < 2 {
            return None;
        }
        let i0 = (fi.floor().max(0.0) as usize).min(width - 2);
        let j0 = (fj.floor().max(0.0) as usize).min(height - 2);
        Some(Cell {
            i0,
            j0,
            wi: fi - i0 as f64,
            wj: fj - j0 as f64,
        })
    }

    /// Corner values in the order `(i0,j0), (i0+1,j0), (i0,j0+1), (i0+1,j0+1)`.
    pub fn corners(&self, value: impl Fn(usize, usize) -> f64) -> [f64; 4] {
        [
            value(self.i0, self.j0),
            value(self.i0 + 1, self.j0),
            value(self.i0, self.j0 + 1),
            value(self.i0 + 1, self.j0 + 1),
        ]
    }

    pub fn interpolate(&self, [v00, v10, v01, v11]: [f64; 4]) -> f64 {
        let top = v00 * (1.0 - self.wi) + v10 * self.wi;
        let bottom = v01 * (1.0 - self.wi) + v11 * self.wi;
        top * (1.0 - self.wj) + bottom * self.wj
    }

    /// Partial derivatives with respect to the fractional grid indices.
    pub fn gradient(&self, [v00, v10, v01, v11]: [f64; 4]) -> (f64, f64) {
        let d_di = (1.0 - self.wj) * (v10 - v00) + self.wj * (v11 - v01);
        let d_dj = (1.0 - self.wi) * (v01 - v00) + self.wi * (v11 - v10);
        (d_di, d_dj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_grid() -> TiePointGrid {
        // value = 10 * i + j
        let values = (0..4)
            .flat_map(|j| (0..3).map(move |i| (10 * i + j) as f32))
            .collect();
        TiePointGrid::new("ramp", 3, 4, 0.5, 0.5, 4.0, 4.0, values).unwrap()
    }

    #[test]
    fn test_construction_checks_value_count() {
        assert!(TiePointGrid::new("g", 3, 3, 0.0, 0.0, 1.0, 1.0, vec![0.0; 8]).is_err());
        assert!(TiePointGrid::new("g", 1, 3, 0.0, 0.0, 1.0, 1.0, vec![0.0; 3]).is_err());
        assert!(TiePointGrid::new("g", 2, 2, 0.0, 0.0, 0.0, 1.0, vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_lat_lon_from_swath_samples() {
        let data = geo_common::SwathModel::antimeridian().tie_points(32);
        let (lat, lon) = TiePointGrid::lat_lon_from(&data).unwrap();
        assert_eq!((lat.grid_width(), lat.grid_height()), (9, 17));
        assert_eq!((lon.raster_width(), lon.raster_height()), (257, 513));
        assert_eq!(lat.discontinuity(), Discontinuity::None);
        assert_eq!(lon.discontinuity(), Discontinuity::At180);
        assert_eq!(lon.value(8, 16), data.lon[data.lon.len() - 1]);
    }

    #[test]
    fn test_default_raster_size() {
        let grid = ramp_grid();
        assert_eq!(grid.raster_width(), 9);
        assert_eq!(grid.raster_height(), 13);

        let grid = grid.with_raster_size(10, 14);
        assert_eq!((grid.raster_width(), grid.raster_height()), (10, 14));
    }

    #[test]
    fn test_sample_hits_grid_points() {
        let grid = ramp_grid();
        assert_eq!(grid.sample(0.5, 0.5), 0.0);
        assert_eq!(grid.sample(4.5, 0.5), 10.0);
        assert_eq!(grid.sample(8.5, 12.5), 23.0);
        assert!((grid.sample(2.5, 2.5) - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolates_beyond_edges() {
        let grid = ramp_grid();
        // half a cell left of the first column
        assert!((grid.interpolate(-0.5, 0.0) - (-5.0)).abs() < 1e-12);
        assert!((grid.interpolate(2.5, 3.0) - 28.0).abs() < 1e-12);
        assert!(grid.interpolate(f64::NAN, 0.0).is_nan());
    }

    #[test]
    fn test_at_180_unwraps_corners() {
        let grid = TiePointGrid::new(
            "lon",
            2,
            2,
            0.0,
            0.0,
            1.0,
            1.0,
            vec![170.0, -170.0, 170.0, -170.0],
        )
        .unwrap();
        assert!((grid.interpolate(0.5, 0.5) - 0.0).abs() < 1e-12);

        let grid = grid.with_discontinuity(Discontinuity::At180);
        let mid = grid.interpolate(0.5, 0.5);
        assert!((mid.abs() - 180.0).abs() < 1e-12);
        assert!((grid.interpolate(0.75, 0.0) - (-175.0)).abs() < 1e-4);
    }

    #[test]
    fn test_cell_gradient() {
        let cell = Cell::locate(3, 3, 0.25, 1.5).unwrap();
        assert_eq!((cell.i0, cell.j0), (0, 1));
        let corners = [0.0, 2.0, 1.0, 3.0];
        let (d_di, d_dj) = cell.gradient(corners);
        assert!((d_di - 2.0).abs() < 1e-12);
        assert!((d_dj - 1.0).abs() < 1e-12);
    }
}
