//! Geocoding driven by latitude/longitude tie-point grids.
//!
//! The forward direction interpolates both grids bilinearly. The inverse
//! direction solves `lat(i, j) = lat, lon(i, j) = lon` for fractional grid
//! indices with Newton's method, seeded by low-order warp polynomials. Large
//! grids are split into tiles with one polynomial each; the seed comes from
//! the tile whose centre is closest to the query. Tiles are fitted on first
//! use and cached until [`GeoCoding::dispose`].
//!
//! Longitudes are unwrapped once at construction into a continuous
//! "normalised" lattice, so grids straddling the antimeridian interpolate
//! without a jump. Inverse lookups map the query longitude into that
//! lattice's range with [`TiePointGeoCoding::normalize_lon`].

use std::any::Any;
use std::sync::{Arc, OnceLock};

use geo_common::position::normalize_lon;
use geo_common::{Datum, GeoCodingError, GeoPos, PixelPos, Result, SubsetDef};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GeoCodingConfig;
use crate::fxy::{FxyOrder, FxySum};
use crate::geocoding::{GeoCoding, GeoCodingKind};
use crate::tie_point_grid::{unwrap_towards, Cell, GridSampler, TiePointGrid};

/// Slack in pixels when deciding whether an inverse result is inside the
/// raster.
const RASTER_EDGE_SLACK: f64 = 1.0e-6;

/// Grid sampling used to fit the inverse warp polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpParameters {
    pub num_x: usize,
    pub num_y: usize,
    pub step_x: usize,
    pub step_y: usize,
}

impl WarpParameters {
    pub fn num_points(&self) -> usize {
        self.num_x * self.num_y
    }

    /// Highest polynomial order the sample layout supports.
    pub fn order(&self) -> FxyOrder {
        let n = self.num_points();
        if n >= 20 && self.num_x >= 4 && self.num_y >= 4 {
            FxyOrder::Cubic
        } else if n >= 12 && self.num_x >= 3 && self.num_y >= 3 {
            FxyOrder::Quadric
        } else {
            FxyOrder::Linear
        }
    }
}

/// Warp sampling for a grid of `grid_width` x `grid_height` tie points using
/// the default point budget.
pub fn determine_warp_parameters(grid_width: usize, grid_height: usize) -> WarpParameters {
    let budget = GeoCodingConfig::default().warp_max_points;
    determine_warp_parameters_with_limit(grid_width, grid_height, budget)
}

/// Warp sampling bounded by `max_points`.
///
/// The stride of the axis with more sampled points is increased one step at
/// a time (X first on ties) until at most `max_points` points remain.
pub fn determine_warp_parameters_with_limit(
    grid_width: usize,
    grid_height: usize,
    max_points: usize,
) -> WarpParameters {
    let width = grid_width.max(1);
    let height = grid_height.max(1);
    let (mut step_x, mut step_y) = (1usize, 1usize);
    loop {
        let num_x = width.div_ceil(step_x);
        let num_y = height.div_ceil(step_y);
        if num_x * num_y <= max_points || (step_x >= width && step_y >= height) {
            return WarpParameters {
                num_x,
                num_y,
                step_x,
                step_y,
            };
        }
        if num_x >= num_y {
            step_x += 1;
        } else {
            step_y += 1;
        }
    }
}

/// Fewest tie points a warp tile may cover.
const MIN_TILE_POINTS: usize = 10;

/// Tiles `(across, down)` used for the inverse warp of a grid.
///
/// Large grids get one polynomial per tile; the tile count grows with the
/// order of magnitude of the number of tie points and the layout follows the
/// grid's aspect ratio.
pub fn determine_warp_tiling(grid_width: usize, grid_height: usize) -> (usize, usize) {
    let num_points = grid_width * grid_height;
    if num_points == 0 {
        return (1, 1);
    }
    let mut num_tiles = ((num_points as f64).log10().round() as usize).saturating_sub(2).max(1);
    while num_tiles > 1 {
        let (across, down) = fit_tile_layout(num_tiles, grid_width, grid_height);
        if num_points / (across * down) >= MIN_TILE_POINTS
            && across < grid_width
            && down < grid_height
        {
            return (across, down);
        }
        num_tiles -= 1;
    }
    (1, 1)
}

fn fit_tile_layout(num_tiles: usize, grid_width: usize, grid_height: usize) -> (usize, usize) {
    let aspect = grid_width as f64 / grid_height as f64;
    let across = ((num_tiles as f64 * aspect).sqrt().round() as usize).clamp(1, num_tiles);
    let down = ((num_tiles as f64 / across as f64).round() as usize).max(1);
    (across, down)
}

/// Inclusive index range of tile `k` of `tiles`; neighbours share an edge.
fn tile_bounds(n: usize, tiles: usize, k: usize) -> (usize, usize) {
    let last = n.saturating_sub(1);
    (k * last / tiles, (k + 1) * last / tiles)
}

/// `lat` if it is a valid latitude, NaN otherwise.
pub fn normalize_lat(lat: f64) -> f64 {
    if (-90.0..=90.0).contains(&lat) {
        lat
    } else {
        f64::NAN
    }
}

/// Maps a coding's raster onto the raster the tie-point grids describe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub offset_x: f64,
    pub offset_y: f64,
    pub sub_sampling_x: f64,
    pub sub_sampling_y: f64,
}

impl PixelWindow {
    fn of_grid(grid: &TiePointGrid) -> Self {
        Self {
            offset_x: grid.offset_x(),
            offset_y: grid.offset_y(),
            sub_sampling_x: grid.sub_sampling_x(),
            sub_sampling_y: grid.sub_sampling_y(),
        }
    }

    fn scale(&self, grid: &TiePointGrid) -> (f64, f64) {
        (
            self.sub_sampling_x / grid.sub_sampling_x(),
            self.sub_sampling_y / grid.sub_sampling_y(),
        )
    }

    fn to_grid_raster(&self, grid: &TiePointGrid, x: f64, y: f64) -> (f64, f64) {
        let (sx, sy) = self.scale(grid);
        (
            (self.offset_x - grid.offset_x()) + x * sx,
            (self.offset_y - grid.offset_y()) + y * sy,
        )
    }

    fn from_grid_raster(&self, grid: &TiePointGrid, gx: f64, gy: f64) -> (f64, f64) {
        let (sx, sy) = self.scale(grid);
        (
            (gx - (self.offset_x - grid.offset_x())) / sx,
            (gy - (self.offset_y - grid.offset_y())) / sy,
        )
    }
}

/// Longitudes unwrapped into one continuous range.
#[derive(Debug)]
struct LonLattice {
    width: usize,
    values: Vec<f64>,
    min: f64,
    max: f64,
}

impl LonLattice {
    fn build(lon_grid: &TiePointGrid) -> Self {
        let width = lon_grid.grid_width();
        let height = lon_grid.grid_height();
        let mut values = vec![0.0; width * height];

        // first column top to bottom, then every row left to right
        values[0] = lon_grid.value(0, 0) as f64;
        for j in 1..height {
            let above = values[(j - 1) * width];
            values[j * width] = unwrap_towards(lon_grid.value(0, j) as f64, above);
        }
        for j in 0..height {
            for i in 1..width {
                let left = values[j * width + i - 1];
                values[j * width + i] = unwrap_towards(lon_grid.value(i, j) as f64, left);
            }
        }

        let mut lattice = Self {
            width,
            values,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        };
        let (min, max) = lattice.extent(lon_grid);
        if min < -180.0 {
            for v in &mut lattice.values {
                *v += 360.0;
            }
            lattice.min = min + 360.0;
            lattice.max = max + 360.0;
        } else {
            lattice.min = min;
            lattice.max = max;
        }
        lattice
    }

    fn height(&self) -> usize {
        self.values.len() / self.width
    }

    fn value(&self, i: usize, j: usize) -> f64 {
        self.values[j * self.width + i]
    }

    fn interpolate(&self, fi: f64, fj: f64) -> f64 {
        match Cell::locate(self.width, self.height(), fi, fj) {
            Some(cell) => cell.interpolate(cell.corners(|i, j| self.value(i, j))),
            None => f64::NAN,
        }
    }

    /// Range of the lattice over the grid's raster, edge extrapolation
    /// included.
    fn extent(&self, grid: &TiePointGrid) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut include = |v: f64| {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
            }
        };
        for &v in &self.values {
            include(v);
        }

        let (i_lo, j_lo) = grid.grid_index(0.0, 0.0);
        let (i_hi, j_hi) = grid.grid_index(grid.raster_width() as f64, grid.raster_height() as f64);
        for j in 0..self.height() {
            include(self.interpolate(i_lo, j as f64));
            include(self.interpolate(i_hi, j as f64));
        }
        for i in 0..self.width {
            include(self.interpolate(i as f64, j_lo));
            include(self.interpolate(i as f64, j_hi));
        }
        for (fi, fj) in [(i_lo, j_lo), (i_hi, j_lo), (i_lo, j_hi), (i_hi, j_hi)] {
            include(self.interpolate(fi, fj));
        }
        (min, max)
    }
}

/// Inverse seed: fractional grid indices as polynomials of centred
/// `(lat, lon)`.
#[derive(Debug, Clone)]
struct WarpPolynomial {
    lat0: f64,
    lon0: f64,
    i_func: FxySum,
    j_func: FxySum,
}

impl WarpPolynomial {
    fn seed(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (dlat, dlon) = (lat - self.lat0, lon - self.lon0);
        (
            self.i_func.compute_z(dlat, dlon),
            self.j_func.compute_z(dlat, dlon),
        )
    }

    fn square_distance(&self, lat: f64, lon: f64, cos_lat: f64) -> f64 {
        let dlat = lat - self.lat0;
        let dlon = (lon - self.lon0) * cos_lat;
        dlat * dlat + dlon * dlon
    }
}

/// Geocoding by bilinear interpolation of latitude and longitude grids.
#[derive(Debug, Clone)]
pub struct TiePointGeoCoding {
    lat_grid: Arc<TiePointGrid>,
    lon_grid: Arc<TiePointGrid>,
    normalized_lon: Arc<LonLattice>,
    window: PixelWindow,
    raster_width: usize,
    raster_height: usize,
    datum: Arc<Datum>,
    config: GeoCodingConfig,
    crossing_meridian_at_180: bool,
    warp: OnceLock<Vec<WarpPolynomial>>,
}

impl TiePointGeoCoding {
    /// Build a WGS-84 coding with default numerics.
    pub fn new(lat_grid: TiePointGrid, lon_grid: TiePointGrid) -> Result<Self> {
        Self::from_shared(
            Arc::new(lat_grid),
            Arc::new(lon_grid),
            Datum::wgs84(),
            GeoCodingConfig::default(),
        )
    }

    pub fn with_config(
        lat_grid: TiePointGrid,
        lon_grid: TiePointGrid,
        datum: Arc<Datum>,
        config: GeoCodingConfig,
    ) -> Result<Self> {
        Self::from_shared(Arc::new(lat_grid), Arc::new(lon_grid), datum, config)
    }

    /// Build from grids that may also be referenced elsewhere.
    pub fn from_shared(
        lat_grid: Arc<TiePointGrid>,
        lon_grid: Arc<TiePointGrid>,
        datum: Arc<Datum>,
        config: GeoCodingConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_grids_match(&lat_grid, &lon_grid)?;

        let normalized_lon = Arc::new(LonLattice::build(&lon_grid));
        let window = PixelWindow::of_grid(&lat_grid);
        let (raster_width, raster_height) = (lat_grid.raster_width(), lat_grid.raster_height());

        let coding = Self::assemble(
            lat_grid,
            lon_grid,
            normalized_lon,
            window,
            raster_width,
            raster_height,
            datum,
            config,
            OnceLock::new(),
        );
        info!(
            grid_width = coding.lat_grid.grid_width(),
            grid_height = coding.lat_grid.grid_height(),
            raster_width,
            raster_height,
            crossing_meridian_at_180 = coding.crossing_meridian_at_180,
            "created tie-point geocoding"
        );
        Ok(coding)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        lat_grid: Arc<TiePointGrid>,
        lon_grid: Arc<TiePointGrid>,
        normalized_lon: Arc<LonLattice>,
        window: PixelWindow,
        raster_width: usize,
        raster_height: usize,
        datum: Arc<Datum>,
        config: GeoCodingConfig,
        warp: OnceLock<Vec<WarpPolynomial>>,
    ) -> Self {
        let mut coding = Self {
            lat_grid,
            lon_grid,
            normalized_lon,
            window,
            raster_width,
            raster_height,
            datum,
            config,
            crossing_meridian_at_180: false,
            warp,
        };
        coding.crossing_meridian_at_180 = coding.detect_crossing();
        coding
    }

    pub fn lat_grid(&self) -> &Arc<TiePointGrid> {
        &self.lat_grid
    }

    pub fn lon_grid(&self) -> &Arc<TiePointGrid> {
        &self.lon_grid
    }

    /// Raster position of grid point (0, 0) in this coding's parent raster.
    pub fn offset_x(&self) -> f64 {
        self.window.offset_x
    }

    pub fn offset_y(&self) -> f64 {
        self.window.offset_y
    }

    /// Raster distance between grid points, in parent raster pixels.
    pub fn sub_sampling_x(&self) -> f64 {
        self.window.sub_sampling_x
    }

    pub fn sub_sampling_y(&self) -> f64 {
        self.window.sub_sampling_y
    }

    pub fn window(&self) -> PixelWindow {
        self.window
    }

    pub fn raster_width(&self) -> usize {
        self.raster_width
    }

    pub fn raster_height(&self) -> usize {
        self.raster_height
    }

    pub fn config(&self) -> &GeoCodingConfig {
        &self.config
    }

    pub fn normalized_lon_min(&self) -> f64 {
        self.normalized_lon.min
    }

    pub fn normalized_lon_max(&self) -> f64 {
        self.normalized_lon.max
    }

    pub fn warp_parameters(&self) -> WarpParameters {
        determine_warp_parameters_with_limit(
            self.lat_grid.grid_width(),
            self.lat_grid.grid_height(),
            self.config.warp_max_points,
        )
    }

    /// True once the inverse warp tiles have been computed.
    pub fn is_warp_cached(&self) -> bool {
        self.warp.get().is_some()
    }

    /// Map a longitude into the normalised range of this coding's grid.
    ///
    /// Returns NaN for input outside [-180, 180] or outside the grid's
    /// coverage.
    pub fn normalize_lon(&self, lon: f64) -> f64 {
        if !(-180.0..=180.0).contains(&lon) {
            return f64::NAN;
        }
        let mut normalized = lon;
        if normalized < self.normalized_lon.min {
            normalized += 360.0;
        }
        if normalized < self.normalized_lon.min || normalized > self.normalized_lon.max {
            f64::NAN
        } else {
            normalized
        }
    }

    pub fn normalize_lat(lat: f64) -> f64 {
        normalize_lat(lat)
    }

    /// Re-parameterise for a raster derived through `subset`.
    pub fn transfer(
        &self,
        subset: &SubsetDef,
        dest_width: usize,
        dest_height: usize,
    ) -> Result<TiePointGeoCoding> {
        if subset.sub_sampling_x == 0 || subset.sub_sampling_y == 0 {
            return Err(GeoCodingError::unsupported_subset(
                "sub-sampling factors must be >= 1",
            ));
        }
        let (sx, sy) = self.window.scale(&self.lat_grid);
        let (rx, ry) = subset.origin();
        let window = PixelWindow {
            offset_x: self.window.offset_x + rx * sx,
            offset_y: self.window.offset_y + ry * sy,
            sub_sampling_x: self.window.sub_sampling_x * subset.sub_sampling_x as f64,
            sub_sampling_y: self.window.sub_sampling_y * subset.sub_sampling_y as f64,
        };

        Ok(Self::assemble(
            Arc::clone(&self.lat_grid),
            Arc::clone(&self.lon_grid),
            Arc::clone(&self.normalized_lon),
            window,
            dest_width,
            dest_height,
            Arc::clone(&self.datum),
            self.config,
            self.warp.clone(),
        ))
    }

    fn contains_pixel(&self, x: f64, y: f64) -> bool {
        x >= -RASTER_EDGE_SLACK
            && y >= -RASTER_EDGE_SLACK
            && x <= self.raster_width as f64 + RASTER_EDGE_SLACK
            && y <= self.raster_height as f64 + RASTER_EDGE_SLACK
    }

    /// Grid index range touched by this coding's raster.
    fn covered_index_range(&self) -> ((usize, usize), (usize, usize)) {
        let grid = &self.lat_grid;
        let (x0, y0) = self.window.to_grid_raster(grid, 0.0, 0.0);
        let (x1, y1) = self.window.to_grid_raster(
            grid,
            self.raster_width as f64,
            self.raster_height as f64,
        );
        let (fi0, fj0) = grid.grid_index(x0, y0);
        let (fi1, fj1) = grid.grid_index(x1, y1);
        let clamp = |v: f64, n: usize| (v.max(0.0) as usize).min(n - 1);
        (
            (
                clamp(fi0.floor(), grid.grid_width()),
                clamp(fi1.ceil(), grid.grid_width()),
            ),
            (
                clamp(fj0.floor(), grid.grid_height()),
                clamp(fj1.ceil(), grid.grid_height()),
            ),
        )
    }

    fn detect_crossing(&self) -> bool {
        let threshold = self.config.crossing_threshold();
        let grid = &self.lon_grid;
        let ((i0, i1), (j0, j1)) = self.covered_index_range();
        for j in j0..=j1 {
            for i in i0..=i1 {
                let lon = grid.value(i, j) as f64;
                if i < i1 && (grid.value(i + 1, j) as f64 - lon).abs() > threshold {
                    return true;
                }
                if j < j1 && (grid.value(i, j + 1) as f64 - lon).abs() > threshold {
                    return true;
                }
            }
        }
        false
    }

    fn warp_tiles(&self) -> &[WarpPolynomial] {
        self.warp.get_or_init(|| self.fit_warp_tiles())
    }

    /// Number of tiles with a fitted warp polynomial, fitting them if needed.
    pub fn warp_tile_count(&self) -> usize {
        self.warp_tiles().len()
    }

    fn fit_warp_tiles(&self) -> Vec<WarpPolynomial> {
        let grid_width = self.lat_grid.grid_width();
        let grid_height = self.lat_grid.grid_height();
        let (tiles_x, tiles_y) = determine_warp_tiling(grid_width, grid_height);

        let mut tiles = Vec::with_capacity(tiles_x * tiles_y);
        for ty in 0..tiles_y {
            let rows = tile_bounds(grid_height, tiles_y, ty);
            for tx in 0..tiles_x {
                let cols = tile_bounds(grid_width, tiles_x, tx);
                match self.fit_warp(cols, rows) {
                    Some(tile) => tiles.push(tile),
                    None => debug!(?cols, ?rows, "no warp polynomial for tile"),
                }
            }
        }
        if tiles.is_empty() {
            warn!("warp polynomial unavailable, seeding inverse from nearest tie point");
        } else {
            debug!(tiles = tiles.len(), tiles_x, tiles_y, "fitted tie-point warp tiles");
        }
        tiles
    }

    /// Fit the warp over the inclusive grid index ranges `cols` x `rows`.
    fn fit_warp(&self, cols: (usize, usize), rows: (usize, usize)) -> Option<WarpPolynomial> {
        let tile_width = cols.1 - cols.0 + 1;
        let tile_height = rows.1 - rows.0 + 1;
        let params = determine_warp_parameters_with_limit(
            tile_width,
            tile_height,
            self.config.warp_max_points,
        );
        let is = sample_indices(tile_width, params.num_x, params.step_x);
        let js = sample_indices(tile_height, params.num_y, params.step_y);

        let mut samples = Vec::with_capacity(is.len() * js.len());
        for &j in &js {
            for &i in &is {
                let (i, j) = (i + cols.0, j + rows.0);
                let lat = self.lat_grid.value(i, j) as f64;
                let lon = self.normalized_lon.value(i, j);
                if lat.is_finite() && lon.is_finite() {
                    samples.push((lat, lon, i as f64, j as f64));
                }
            }
        }
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let lat0 = samples.iter().map(|s| s.0).sum::<f64>() / n;
        let lon0 = samples.iter().map(|s| s.1).sum::<f64>() / n;
        let i_points: Vec<_> = samples
            .iter()
            .map(|&(lat, lon, i, _)| (lat - lat0, lon - lon0, i))
            .collect();
        let j_points: Vec<_> = samples
            .iter()
            .map(|&(lat, lon, _, j)| (lat - lat0, lon - lon0, j))
            .collect();

        let tolerance = self.config.fit_rank_tolerance;
        let mut order = Some(params.order());
        while let Some(current) = order {
            match (
                FxySum::fit_with_tolerance(&i_points, current, tolerance),
                FxySum::fit_with_tolerance(&j_points, current, tolerance),
            ) {
                (Ok(i_func), Ok(j_func)) => {
                    debug!(
                        order = ?current,
                        points = samples.len(),
                        rmse_i = i_func.rmse(&i_points),
                        rmse_j = j_func.rmse(&j_points),
                        "fitted tie-point warp polynomial"
                    );
                    return Some(WarpPolynomial {
                        lat0,
                        lon0,
                        i_func,
                        j_func,
                    });
                }
                (Err(e), _) | (_, Err(e)) => {
                    debug!(order = ?current, error = %e, "warp fit failed");
                    order = lower_order(current);
                }
            }
        }
        None
    }

    /// Tile whose sample centre lies closest to `(lat, lon)`.
    fn nearest_warp_tile(&self, lat: f64, lon: f64) -> Option<&WarpPolynomial> {
        let cos_lat = lat.to_radians().cos();
        self.warp_tiles().iter().min_by(|a, b| {
            a.square_distance(lat, lon, cos_lat)
                .total_cmp(&b.square_distance(lat, lon, cos_lat))
        })
    }

    fn nearest_tie_point(&self, lat: f64, lon: f64) -> (f64, f64) {
        let cos_lat = lat.to_radians().cos();
        let mut best = (0.0, 0.0);
        let mut best_dist = f64::INFINITY;
        for j in 0..self.lat_grid.grid_height() {
            for i in 0..self.lat_grid.grid_width() {
                let dlat = self.lat_grid.value(i, j) as f64 - lat;
                let dlon = (self.normalized_lon.value(i, j) - lon) * cos_lat;
                let dist = dlat * dlat + dlon * dlon;
                if dist < best_dist {
                    best_dist = dist;
                    best = (i as f64, j as f64);
                }
            }
        }
        best
    }

    /// Newton iteration on the bilinear surfaces, in grid index space.
    fn refine(&self, seed: (f64, f64), lat: f64, lon: f64) -> Option<(f64, f64)> {
        let width = self.lat_grid.grid_width();
        let height = self.lat_grid.grid_height();
        let (i_lo, i_hi, j_lo, j_hi) = self.search_bounds();
        let (mut fi, mut fj) = seed;
        if !(fi.is_finite() && fj.is_finite()) {
            return None;
        }
        fi = fi.clamp(i_lo, i_hi);
        fj = fj.clamp(j_lo, j_hi);

        for _ in 0..self.config.newton_max_iterations {
            let cell = Cell::locate(width, height, fi, fj)?;
            let lat_corners = cell.corners(|i, j| self.lat_grid.value(i, j) as f64);
            let lon_corners = cell.corners(|i, j| self.normalized_lon.value(i, j));
            let r_lat = cell.interpolate(lat_corners) - lat;
            let r_lon = cell.interpolate(lon_corners) - lon;
            let (a, b) = cell.gradient(lat_corners);
            let (c, d) = cell.gradient(lon_corners);

            let det = a * d - b * c;
            if !det.is_finite() || det.abs() < f64::EPSILON * (a.abs() + b.abs()) * (c.abs() + d.abs()) {
                return None;
            }
            let di = (d * r_lat - b * r_lon) / det;
            let dj = (a * r_lon - c * r_lat) / det;
            fi = (fi - di).clamp(i_lo, i_hi);
            fj = (fj - dj).clamp(j_lo, j_hi);

            if di.abs() < self.config.newton_tolerance && dj.abs() < self.config.newton_tolerance {
                return Some((fi, fj));
            }
        }
        None
    }

    /// Grid index bounds of the search: the grid's raster plus one cell.
    fn search_bounds(&self) -> (f64, f64, f64, f64) {
        let grid = &self.lat_grid;
        let (i_lo, j_lo) = grid.grid_index(0.0, 0.0);
        let (i_hi, j_hi) = grid.grid_index(grid.raster_width() as f64, grid.raster_height() as f64);
        (
            i_lo.min(0.0) - 1.0,
            i_hi.max((grid.grid_width() - 1) as f64) + 1.0,
            j_lo.min(0.0) - 1.0,
            j_hi.max((grid.grid_height() - 1) as f64) + 1.0,
        )
    }

    fn solve_grid_index(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if let Some(warp) = self.nearest_warp_tile(lat, lon) {
            if let Some(found) = self.refine(warp.seed(lat, lon), lat, lon) {
                return Some(found);
            }
        }
        self.refine(self.nearest_tie_point(lat, lon), lat, lon)
    }
}

impl GeoCoding for TiePointGeoCoding {
    fn get_geo_pos(&self, pixel: PixelPos) -> GeoPos {
        if !pixel.is_valid() || !self.contains_pixel(pixel.x, pixel.y) {
            return GeoPos::invalid();
        }
        let (gx, gy) = self.window.to_grid_raster(&self.lat_grid, pixel.x, pixel.y);
        let (fi, fj) = self.lat_grid.grid_index(gx, gy);
        let lat = self.lat_grid.interpolate(fi, fj);
        let lon = self.normalized_lon.interpolate(fi, fj);
        GeoPos::new(lat, normalize_lon(lon))
    }

    fn get_pixel_pos(&self, geo: GeoPos) -> PixelPos {
        if !geo.is_valid() {
            return PixelPos::invalid();
        }
        let lat = normalize_lat(geo.lat);
        let lon = self.normalize_lon(geo.lon);
        if lat.is_nan() || lon.is_nan() {
            return PixelPos::invalid();
        }

        let Some((fi, fj)) = self.solve_grid_index(lat, lon) else {
            return PixelPos::invalid();
        };
        let (gx, gy) = self.lat_grid.raster_position(fi, fj);
        let (x, y) = self.window.from_grid_raster(&self.lat_grid, gx, gy);
        if self.contains_pixel(x, y) {
            PixelPos::new(x, y)
        } else {
            PixelPos::invalid()
        }
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        self.crossing_meridian_at_180
    }

    fn datum(&self) -> &Arc<Datum> {
        &self.datum
    }

    fn kind(&self) -> GeoCodingKind {
        GeoCodingKind::TiePoint
    }

    fn clone_box(&self) -> Box<dyn GeoCoding> {
        Box::new(self.clone())
    }

    fn dispose(&mut self) {
        if self.warp.take().is_some() {
            debug!("dropped tie-point warp tiles");
        }
    }

    fn subset(
        &self,
        subset: &SubsetDef,
        dest_width: usize,
        dest_height: usize,
    ) -> Result<Box<dyn GeoCoding>> {
        Ok(Box::new(self.transfer(subset, dest_width, dest_height)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn check_grids_match(lat: &TiePointGrid, lon: &TiePointGrid) -> Result<()> {
    if lat.grid_width() != lon.grid_width() || lat.grid_height() != lon.grid_height() {
        return Err(GeoCodingError::configuration(format!(
            "latitude grid is {}x{} but longitude grid is {}x{}",
            lat.grid_width(),
            lat.grid_height(),
            lon.grid_width(),
            lon.grid_height()
        )));
    }
    if lat.offset_x() != lon.offset_x() || lat.offset_y() != lon.offset_y() {
        return Err(GeoCodingError::configuration(
            "latitude and longitude grids have different offsets",
        ));
    }
    if lat.sub_sampling_x() != lon.sub_sampling_x() || lat.sub_sampling_y() != lon.sub_sampling_y() {
        return Err(GeoCodingError::configuration(
            "latitude and longitude grids have different sub-sampling",
        ));
    }
    if lat.raster_width() != lon.raster_width() || lat.raster_height() != lon.raster_height() {
        return Err(GeoCodingError::configuration(
            "latitude and longitude grids cover different rasters",
        ));
    }
    Ok(())
}

/// `num` indices spread `step` apart; the last one is always `n - 1`.
fn sample_indices(n: usize, num: usize, step: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..num.saturating_sub(1))
        .map(|k| k * step)
        .filter(|&i| i < n - 1)
        .collect();
    indices.push(n - 1);
    indices
}

fn lower_order(order: FxyOrder) -> Option<FxyOrder> {
    match order {
        FxyOrder::Cubic => Some(FxyOrder::Quadric),
        FxyOrder::Quadric => Some(FxyOrder::Linear),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic_grids() -> (TiePointGrid, TiePointGrid) {
        let make = |v0: f32, v1: f32| -> Vec<f32> {
            let mut values = Vec::with_capacity(15);
            for j in 0..5 {
                for i in 0..3 {
                    let x = i as f64 / 2.0;
                    let y = j as f64 / 4.0;
                    let d = v1 - v0;
                    values.push((v0 as f64 + d as f64 * x * x + (0.1f32 * d) as f64 * y * y) as f32);
                }
            }
            values
        };
        (
            TiePointGrid::new("lat", 3, 5, 0.5, 0.5, 4.0, 4.0, make(53.0, 50.0)).unwrap(),
            TiePointGrid::new("lon", 3, 5, 0.5, 0.5, 4.0, 4.0, make(10.0, 15.0)).unwrap(),
        )
    }

    #[test]
    fn test_determine_warp_parameters() {
        assert_eq!(
            determine_warp_parameters(100, 100),
            WarpParameters {
                num_x: 25,
                num_y: 34,
                step_x: 4,
                step_y: 3
            }
        );
        assert_eq!(
            determine_warp_parameters(39, 2728),
            WarpParameters {
                num_x: 20,
                num_y: 39,
                step_x: 2,
                step_y: 70
            }
        );
        let small = determine_warp_parameters(3, 5);
        assert_eq!((small.step_x, small.step_y), (1, 1));
        assert_eq!(small.order(), FxyOrder::Quadric);
    }

    #[test]
    fn test_sample_indices_include_last() {
        assert_eq!(sample_indices(10, 4, 3), vec![0, 3, 6, 9]);
        assert_eq!(sample_indices(11, 4, 3), vec![0, 3, 6, 10]);
        assert_eq!(sample_indices(2, 1, 2), vec![1]);
    }

    #[test]
    fn test_mismatched_grids_are_rejected() {
        let (lat, _) = quadratic_grids();
        let lon = TiePointGrid::new("lon", 3, 4, 0.5, 0.5, 4.0, 4.0, vec![0.0; 12]).unwrap();
        let err = TiePointGeoCoding::new(lat.clone(), lon).unwrap_err();
        assert!(err.is_configuration());

        let lon = TiePointGrid::new("lon", 3, 5, 1.5, 0.5, 4.0, 4.0, vec![0.0; 15]).unwrap();
        assert!(TiePointGeoCoding::new(lat, lon).is_err());
    }

    #[test]
    fn test_forward_matches_known_values() {
        let (lat, lon) = quadratic_grids();
        let coding = TiePointGeoCoding::new(lat, lon).unwrap();
        let geo = coding.get_geo_pos(PixelPos::new(4.0, 3.0));
        assert!((geo.lon - 11.11328125).abs() < 1e-8);
        assert!((geo.lat - 52.33203172683716).abs() < 1e-8);
    }

    #[test]
    fn test_outside_raster_is_invalid() {
        let (lat, lon) = quadratic_grids();
        let coding = TiePointGeoCoding::new(lat, lon).unwrap();
        assert!(!coding.get_geo_pos(PixelPos::new(-1.0, 3.0)).is_valid());
        assert!(!coding.get_geo_pos(PixelPos::new(4.0, 18.0)).is_valid());
        assert!(!coding.get_pixel_pos(GeoPos::new(0.0, 0.0)).is_valid());
    }

    #[test]
    fn test_warp_is_lazy_and_disposable() {
        let (lat, lon) = quadratic_grids();
        let mut coding = TiePointGeoCoding::new(lat, lon).unwrap();
        assert!(!coding.is_warp_cached());

        let geo = coding.get_geo_pos(PixelPos::new(2.5, 7.5));
        let pixel = coding.get_pixel_pos(geo);
        assert!(coding.is_warp_cached());
        assert!((pixel.x - 2.5).abs() < 1e-3);
        assert!((pixel.y - 7.5).abs() < 1e-3);

        coding.dispose();
        assert!(!coding.is_warp_cached());
        coding.dispose();

        let again = coding.get_pixel_pos(geo);
        assert!((again.x - pixel.x).abs() < 1e-9);
        assert!((again.y - pixel.y).abs() < 1e-9);
    }

    #[test]
    fn test_determine_warp_tiling() {
        assert_eq!(determine_warp_tiling(3, 5), (1, 1));
        assert_eq!(determine_warp_tiling(33, 65), (1, 1));
        assert_eq!(determine_warp_tiling(71, 141), (1, 2));
        assert_eq!(determine_warp_tiling(200, 200), (2, 2));
        assert_eq!(determine_warp_tiling(0, 10), (1, 1));
    }

    #[test]
    fn test_tile_bounds_share_edges() {
        assert_eq!(tile_bounds(101, 2, 0), (0, 50));
        assert_eq!(tile_bounds(101, 2, 1), (50, 100));
        assert_eq!(tile_bounds(1, 1, 0), (0, 0));
    }

    #[test]
    fn test_tiled_warp_round_trip() {
        // 101x101 tie points, curved enough that one polynomial is a poor seed
        let n = 101;
        let mut lat = Vec::with_capacity(n * n);
        let mut lon = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                let (u, v) = (i as f64 / 100.0, j as f64 / 100.0);
                lat.push((60.0 - 30.0 * v + 2.0 * (u * 3.0).sin()) as f32);
                lon.push((-20.0 + 40.0 * u + 5.0 * v * v * u) as f32);
            }
        }
        let lat = TiePointGrid::new("lat", n, n, 0.5, 0.5, 4.0, 4.0, lat).unwrap();
        let lon = TiePointGrid::new("lon", n, n, 0.5, 0.5, 4.0, 4.0, lon).unwrap();
        let coding = TiePointGeoCoding::new(lat, lon).unwrap();
        assert_eq!(coding.warp_tile_count(), 2);

        for &(x, y) in &[(10.5, 20.5), (200.0, 150.0), (390.0, 380.0), (55.0, 399.0)] {
            let geo = coding.get_geo_pos(PixelPos::new(x, y));
            let pixel = coding.get_pixel_pos(geo);
            assert!((pixel.x - x).abs() < 1e-3, "x {x} -> {}", pixel.x);
            assert!((pixel.y - y).abs() < 1e-3, "y {y} -> {}", pixel.y);
        }
    }

    #[test]
    fn test_normalize_lat() {
        assert!(normalize_lat(-90.1).is_nan());
        assert!(normalize_lat(90.1).is_nan());
        assert_eq!(normalize_lat(-90.0), -90.0);
        assert_eq!(normalize_lat(90.0), 90.0);
        assert!(normalize_lat(f64::NAN).is_nan());
    }

    #[test]
    fn test_normalize_lon_across_antimeridian() {
        // 2x2 grid from 170 to -170
        let lat = TiePointGrid::new("lat", 2, 2, 0.0, 0.0, 10.0, 10.0, vec![10.0, 10.0, 0.0, 0.0])
            .unwrap();
        let lon = TiePointGrid::new(
            "lon",
            2,
            2,
            0.0,
            0.0,
            10.0,
            10.0,
            vec![170.0, -170.0, 170.0, -170.0],
        )
        .unwrap();
        let coding = TiePointGeoCoding::new(lat, lon).unwrap();

        assert!(coding.is_crossing_meridian_at_180());
        assert!((coding.normalized_lon_min() - 170.0).abs() < 1e-9);
        assert!(coding.normalized_lon_max() > 190.0);
        assert!((coding.normalize_lon(-175.0) - 185.0).abs() < 1e-12);
        assert_eq!(coding.normalize_lon(175.0), 175.0);
        assert!(coding.normalize_lon(0.0).is_nan());
        assert!(coding.normalize_lon(180.1).is_nan());

        let geo = coding.get_geo_pos(PixelPos::new(7.5, 5.0));
        assert!((geo.lon - (-175.0)).abs() < 1e-4);
        let pixel = coding.get_pixel_pos(geo);
        assert!((pixel.x - 7.5).abs() < 1e-3);
        assert!((pixel.y - 5.0).abs() < 1e-3);
    }
}
