//! Geocoding fitted through ground control points.
//!
//! The GCP geo positions are rotated so that their centroid sits at
//! `(lon, lat) = (0, 0)`; forward (pixel to rotated geo) and inverse (rotated
//! geo to pixel) polynomials are then fitted by least squares in that frame.
//! Working in the rotated frame keeps the fit continuous for GCP sets that
//! straddle the antimeridian or surround a pole.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use geo_common::position::normalize_lon;
use geo_common::{Datum, FitError, GeoCodingError, GeoPos, PixelPos, Result, SubsetDef};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GeoCodingConfig;
use crate::fxy::{FxyOrder, FxySum};
use crate::geocoding::{GeoCoding, GeoCodingKind};
use crate::hull::ConvexHull;
use crate::rotator::Rotator;

/// Boundary tolerance for hull tests, in squared input units.
const HULL_TOLERANCE: f64 = 1.0e-9;

/// Slack in pixels when deciding whether an inverse result is inside the
/// raster.
const RASTER_EDGE_SLACK: f64 = 1.0e-6;

/// A known correspondence between a pixel and a geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gcp {
    pub pixel: PixelPos,
    pub geo: GeoPos,
}

impl Gcp {
    pub fn new(pixel: PixelPos, geo: GeoPos) -> Self {
        Self { pixel, geo }
    }

    pub fn is_valid(&self) -> bool {
        self.pixel.is_valid() && self.geo.is_valid()
    }
}

/// Polynomial order used to fit the GCPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GcpMethod {
    /// Linear, at least 3 GCPs.
    Polynomial1,
    /// Quadratic, at least 6 GCPs.
    Polynomial2,
    /// Cubic, at least 10 GCPs.
    Polynomial3,
}

impl GcpMethod {
    pub fn order(&self) -> FxyOrder {
        match self {
            GcpMethod::Polynomial1 => FxyOrder::Linear,
            GcpMethod::Polynomial2 => FxyOrder::Quadric,
            GcpMethod::Polynomial3 => FxyOrder::Cubic,
        }
    }

    pub fn required_points(&self) -> usize {
        self.order().num_terms()
    }
}

impl fmt::Display for GcpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GcpMethod::Polynomial1 => "Linear Equation (1st order)",
            GcpMethod::Polynomial2 => "Quadratic Equation (2nd order)",
            GcpMethod::Polynomial3 => "Cubic Equation (3rd order)",
        };
        f.write_str(name)
    }
}

/// True when the shorter path between two longitudes crosses ±180°.
pub fn is_segment_crossing_meridian_at_180(lon1: f64, lon2: f64) -> bool {
    (lon1 - lon2).abs() > 180.0
}

/// Centroid of a set of geo positions.
///
/// Longitudes are unwrapped when the set spans more than 180 degrees of
/// longitude, which is taken as straddling the antimeridian. The plain mean
/// is then refined once by averaging in a frame rotated to that mean.
pub fn calculate_central_geo_pos(positions: &[GeoPos]) -> GeoPos {
    let valid: Vec<GeoPos> = positions.iter().copied().filter(GeoPos::is_valid).collect();
    if valid.is_empty() {
        return GeoPos::invalid();
    }

    let lon_min = valid.iter().map(|p| p.lon).fold(f64::INFINITY, f64::min);
    let lon_max = valid.iter().map(|p| p.lon).fold(f64::NEG_INFINITY, f64::max);
    let crosses = is_segment_crossing_meridian_at_180(lon_min, lon_max);
    let n = valid.len() as f64;
    let mut lon_sum = 0.0;
    let mut lat_sum = 0.0;
    for pos in &valid {
        lon_sum += if crosses && pos.lon < 0.0 { pos.lon + 360.0 } else { pos.lon };
        lat_sum += pos.lat;
    }
    let mut lon = lon_sum / n;
    let lat = lat_sum / n;
    if lon > 180.0 {
        lon -= 360.0;
    }

    let rotator = Rotator::new(lon, lat);
    let (mut rlon_sum, mut rlat_sum) = (0.0, 0.0);
    for pos in &valid {
        let (rlon, rlat) = rotator.transform(pos.lon, pos.lat);
        rlon_sum += rlon;
        rlat_sum += rlat;
    }
    let (lon, lat) = rotator.transform_inversely(rlon_sum / n, rlat_sum / n);
    GeoPos::new(lat, normalize_lon(lon))
}

/// Affine map from this coding's pixels to the pixel space of the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelTransform {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl PixelTransform {
    pub fn identity() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.offset_x + x * self.scale_x, self.offset_y + y * self.scale_y)
    }

    fn invert(&self, fx: f64, fy: f64) -> (f64, f64) {
        ((fx - self.offset_x) / self.scale_x, (fy - self.offset_y) / self.scale_y)
    }
}

impl Default for PixelTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Residuals of the four fitted polynomials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GcpRmse {
    /// Rotated latitude, degrees.
    pub lat: f64,
    /// Rotated longitude, degrees.
    pub lon: f64,
    /// Pixels.
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
struct GcpFit {
    rotator: Rotator,
    center: GeoPos,
    /// Mean GCP pixel; forward polynomials take pixels relative to it.
    pixel_center: (f64, f64),
    forward_lon: FxySum,
    forward_lat: FxySum,
    inverse_x: FxySum,
    inverse_y: FxySum,
    rmse: GcpRmse,
    pixel_hull: ConvexHull,
    geo_hull: ConvexHull,
}

impl GcpFit {
    fn compute(gcps: &[Gcp], order: FxyOrder, rank_tolerance: f64) -> std::result::Result<Self, FitError> {
        let geos: Vec<GeoPos> = gcps.iter().map(|g| g.geo).collect();
        let center = calculate_central_geo_pos(&geos);
        let rotator = Rotator::from_point(center, 0.0);

        let n = gcps.len() as f64;
        let cx = gcps.iter().map(|g| g.pixel.x).sum::<f64>() / n;
        let cy = gcps.iter().map(|g| g.pixel.y).sum::<f64>() / n;

        let rotated: Vec<(f64, f64)> = gcps
            .iter()
            .map(|g| rotator.transform(g.geo.lon, g.geo.lat))
            .collect();

        let mut lon_points = Vec::with_capacity(gcps.len());
        let mut lat_points = Vec::with_capacity(gcps.len());
        let mut x_points = Vec::with_capacity(gcps.len());
        let mut y_points = Vec::with_capacity(gcps.len());
        for (gcp, &(rlon, rlat)) in gcps.iter().zip(&rotated) {
            let (px, py) = (gcp.pixel.x - cx, gcp.pixel.y - cy);
            lon_points.push((px, py, rlon));
            lat_points.push((px, py, rlat));
            x_points.push((rlon, rlat, gcp.pixel.x));
            y_points.push((rlon, rlat, gcp.pixel.y));
        }

        let forward_lon = FxySum::fit_with_tolerance(&lon_points, order, rank_tolerance)?;
        let forward_lat = FxySum::fit_with_tolerance(&lat_points, order, rank_tolerance)?;
        let inverse_x = FxySum::fit_with_tolerance(&x_points, order, rank_tolerance)?;
        let inverse_y = FxySum::fit_with_tolerance(&y_points, order, rank_tolerance)?;

        let rmse = GcpRmse {
            lat: forward_lat.rmse(&lat_points),
            lon: forward_lon.rmse(&lon_points),
            x: inverse_x.rmse(&x_points),
            y: inverse_y.rmse(&y_points),
        };

        let pixels: Vec<(f64, f64)> = gcps.iter().map(|g| (g.pixel.x, g.pixel.y)).collect();
        Ok(Self {
            rotator,
            center,
            pixel_center: (cx, cy),
            forward_lon,
            forward_lat,
            inverse_x,
            inverse_y,
            rmse,
            pixel_hull: ConvexHull::from_points(&pixels),
            geo_hull: ConvexHull::from_points(&rotated),
        })
    }
}

/// Geocoding by polynomial fit through ground control points, with an
/// optional fallback coding for positions outside the GCP coverage.
#[derive(Debug, Clone)]
pub struct GcpGeoCoding {
    method: GcpMethod,
    gcps: Vec<Gcp>,
    raster_width: usize,
    raster_height: usize,
    datum: Arc<Datum>,
    config: GeoCodingConfig,
    /// `None` only when the fit failed and a fallback carries the coding.
    fit: Option<GcpFit>,
    pixel_transform: PixelTransform,
    original: Option<Box<dyn GeoCoding>>,
    crossing_meridian_at_180: bool,
}

impl GcpGeoCoding {
    pub fn new(
        method: GcpMethod,
        gcps: Vec<Gcp>,
        raster_width: usize,
        raster_height: usize,
        datum: Arc<Datum>,
    ) -> Result<Self> {
        Self::with_config(
            method,
            gcps,
            raster_width,
            raster_height,
            datum,
            None,
            GeoCodingConfig::default(),
        )
    }

    /// Build with a fallback coding used outside the GCP coverage and in
    /// place of an ill-conditioned fit.
    pub fn with_original_geo_coding(
        method: GcpMethod,
        gcps: Vec<Gcp>,
        raster_width: usize,
        raster_height: usize,
        datum: Arc<Datum>,
        original: Box<dyn GeoCoding>,
    ) -> Result<Self> {
        Self::with_config(
            method,
            gcps,
            raster_width,
            raster_height,
            datum,
            Some(original),
            GeoCodingConfig::default(),
        )
    }

    pub fn with_config(
        method: GcpMethod,
        gcps: Vec<Gcp>,
        raster_width: usize,
        raster_height: usize,
        datum: Arc<Datum>,
        original: Option<Box<dyn GeoCoding>>,
        config: GeoCodingConfig,
    ) -> Result<Self> {
        config.validate()?;
        if raster_width == 0 || raster_height == 0 {
            return Err(GeoCodingError::configuration(format!(
                "raster size must be positive, got {}x{}",
                raster_width, raster_height
            )));
        }
        let required = method.required_points();
        if gcps.len() < required {
            return Err(GeoCodingError::configuration(format!(
                "{} needs at least {} GCPs, got {}",
                method,
                required,
                gcps.len()
            )));
        }
        if let Some(index) = gcps.iter().position(|g| !g.is_valid()) {
            return Err(GeoCodingError::configuration(format!(
                "GCP {} has an invalid position",
                index
            )));
        }

        let fit = match GcpFit::compute(&gcps, method.order(), config.fit_rank_tolerance) {
            Ok(fit) => Some(fit),
            Err(e) if original.is_some() => {
                warn!(error = %e, "GCP fit failed, delegating to original geocoding");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut coding = Self {
            method,
            gcps,
            raster_width,
            raster_height,
            datum,
            config,
            fit,
            pixel_transform: PixelTransform::identity(),
            original,
            crossing_meridian_at_180: false,
        };
        coding.crossing_meridian_at_180 = coding.detect_crossing();

        if let Some(fit) = &coding.fit {
            info!(
                method = %coding.method,
                gcps = coding.gcps.len(),
                center_lat = fit.center.lat,
                center_lon = fit.center.lon,
                rmse_x = fit.rmse.x,
                rmse_y = fit.rmse.y,
                "created GCP geocoding"
            );
        }
        Ok(coding)
    }

    pub fn method(&self) -> GcpMethod {
        self.method
    }

    /// GCPs in this coding's pixel space.
    pub fn gcps(&self) -> &[Gcp] {
        &self.gcps
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

    pub fn original_geo_coding(&self) -> Option<&dyn GeoCoding> {
        self.original.as_deref()
    }

    /// Map from this coding's pixels to the pixels the fit was made in.
    pub fn pixel_transform(&self) -> PixelTransform {
        self.pixel_transform
    }

    /// True if the fit failed and every lookup goes to the original coding.
    pub fn is_delegating(&self) -> bool {
        self.fit.is_none()
    }

    /// Rotation centre; invalid when delegating.
    pub fn center(&self) -> GeoPos {
        self.fit.as_ref().map_or_else(GeoPos::invalid, |f| f.center)
    }

    pub fn rmse(&self) -> Option<GcpRmse> {
        self.fit.as_ref().map(|f| f.rmse)
    }

    pub fn rmse_lat(&self) -> f64 {
        self.rmse().map_or(f64::NAN, |r| r.lat)
    }

    pub fn rmse_lon(&self) -> f64 {
        self.rmse().map_or(f64::NAN, |r| r.lon)
    }

    pub fn rmse_x(&self) -> f64 {
        self.rmse().map_or(f64::NAN, |r| r.x)
    }

    pub fn rmse_y(&self) -> f64 {
        self.rmse().map_or(f64::NAN, |r| r.y)
    }

    /// Forward polynomials `(rotated lon, rotated lat)`, evaluated on fit
    /// pixels relative to [`GcpGeoCoding::pixel_center`].
    pub fn forward_functions(&self) -> Option<(&FxySum, &FxySum)> {
        self.fit.as_ref().map(|f| (&f.forward_lon, &f.forward_lat))
    }

    /// Inverse polynomials `(x, y)` of rotated `(lon, lat)`.
    pub fn inverse_functions(&self) -> Option<(&FxySum, &FxySum)> {
        self.fit.as_ref().map(|f| (&f.inverse_x, &f.inverse_y))
    }

    pub fn pixel_center(&self) -> Option<(f64, f64)> {
        self.fit.as_ref().map(|f| f.pixel_center)
    }

    /// Recompute the fit from the current GCPs.
    pub fn refit(&self) -> Result<GcpGeoCoding> {
        self.refit_with(self.method, self.gcps.clone())
    }

    /// Fit a new coding over the same raster from edited GCPs or another
    /// method. `self` is left untouched, also when the fit fails.
    pub fn refit_with(&self, method: GcpMethod, gcps: Vec<Gcp>) -> Result<GcpGeoCoding> {
        debug!(?method, gcps = gcps.len(), "refitting gcp geocoding");
        Self::with_config(
            method,
            gcps,
            self.raster_width,
            self.raster_height,
            Arc::clone(&self.datum),
            self.original.clone(),
            self.config,
        )
    }

    /// Re-parameterise for a raster derived through `subset`. The fit is
    /// kept and composed with the new pixel transform.
    pub fn transfer(
        &self,
        subset: &SubsetDef,
        dest_width: usize,
        dest_height: usize,
    ) -> Result<GcpGeoCoding> {
        if subset.sub_sampling_x == 0 || subset.sub_sampling_y == 0 {
            return Err(GeoCodingError::unsupported_subset(
                "sub-sampling factors must be >= 1",
            ));
        }
        if dest_width == 0 || dest_height == 0 {
            return Err(GeoCodingError::unsupported_subset(
                "derived raster is empty",
            ));
        }
        let (ox, oy) = subset.origin();
        let (step_x, step_y) = (subset.sub_sampling_x as f64, subset.sub_sampling_y as f64);

        let (offset_x, offset_y) = self.pixel_transform.apply(ox, oy);
        let pixel_transform = PixelTransform {
            offset_x,
            offset_y,
            scale_x: self.pixel_transform.scale_x * step_x,
            scale_y: self.pixel_transform.scale_y * step_y,
        };

        let gcps = self
            .gcps
            .iter()
            .map(|g| {
                Gcp::new(
                    PixelPos::new((g.pixel.x - ox) / step_x, (g.pixel.y - oy) / step_y),
                    g.geo,
                )
            })
            .collect();

        let original = match &self.original {
            Some(original) => Some(original.subset(subset, dest_width, dest_height)?),
            None => None,
        };

        let mut coding = Self {
            method: self.method,
            gcps,
            raster_width: dest_width,
            raster_height: dest_height,
            datum: Arc::clone(&self.datum),
            config: self.config,
            fit: self.fit.clone(),
            pixel_transform,
            original,
            crossing_meridian_at_180: false,
        };
        coding.crossing_meridian_at_180 = coding.detect_crossing();
        Ok(coding)
    }

    fn contains_pixel(&self, x: f64, y: f64) -> bool {
        x >= -RASTER_EDGE_SLACK
            && y >= -RASTER_EDGE_SLACK
            && x <= self.raster_width as f64 + RASTER_EDGE_SLACK
            && y <= self.raster_height as f64 + RASTER_EDGE_SLACK
    }

    fn fallback_geo_pos(&self, pixel: PixelPos) -> GeoPos {
        self.original
            .as_ref()
            .map_or_else(GeoPos::invalid, |o| o.get_geo_pos(pixel))
    }

    fn fallback_pixel_pos(&self, geo: GeoPos) -> PixelPos {
        self.original
            .as_ref()
            .map_or_else(PixelPos::invalid, |o| o.get_pixel_pos(geo))
    }

    /// Walk the raster boundary and look for consecutive positions on
    /// opposite sides of the antimeridian.
    fn detect_crossing(&self) -> bool {
        let step = self.config.gcp_boundary_step.max(1);
        let (w, h) = (self.raster_width, self.raster_height);

        let mut boundary = Vec::new();
        let mut edge = |from: (usize, usize), to: (usize, usize)| {
            let len = from.0.abs_diff(to.0).max(from.1.abs_diff(to.1));
            let mut k = 0;
            while k < len {
                let t = k as f64 / len as f64;
                boundary.push((
                    from.0 as f64 + t * (to.0 as f64 - from.0 as f64),
                    from.1 as f64 + t * (to.1 as f64 - from.1 as f64),
                ));
                k += step;
            }
        };
        edge((0, 0), (w, 0));
        edge((w, 0), (w, h));
        edge((w, h), (0, h));
        edge((0, h), (0, 0));

        let lons: Vec<f64> = boundary
            .iter()
            .map(|&(x, y)| self.get_geo_pos(PixelPos::new(x, y)).lon)
            .filter(|lon| lon.is_finite())
            .collect();
        let n = lons.len();
        if n < 2 {
            return false;
        }
        (0..n).any(|k| is_segment_crossing_meridian_at_180(lons[k], lons[(k + 1) % n]))
    }
}

impl GeoCoding for GcpGeoCoding {
    fn get_geo_pos(&self, pixel: PixelPos) -> GeoPos {
        if !pixel.is_valid() {
            return GeoPos::invalid();
        }
        let Some(fit) = &self.fit else {
            return self.fallback_geo_pos(pixel);
        };

        let (fx, fy) = self.pixel_transform.apply(pixel.x, pixel.y);
        if self.original.is_some() && !fit.pixel_hull.contains(fx, fy, HULL_TOLERANCE) {
            return self.fallback_geo_pos(pixel);
        }

        let (px, py) = (fx - fit.pixel_center.0, fy - fit.pixel_center.1);
        let rlon = fit.forward_lon.compute_z(px, py);
        let rlat = fit.forward_lat.compute_z(px, py);
        let (lon, lat) = fit.rotator.transform_inversely(rlon, rlat);
        GeoPos::new(lat, normalize_lon(lon))
    }

    fn get_pixel_pos(&self, geo: GeoPos) -> PixelPos {
        if !geo.is_valid() {
            return PixelPos::invalid();
        }
        let Some(fit) = &self.fit else {
            return self.fallback_pixel_pos(geo);
        };

        let (rlon, rlat) = fit.rotator.transform(geo.lon, geo.lat);
        if self.original.is_some() && !fit.geo_hull.contains(rlon, rlat, HULL_TOLERANCE) {
            return self.fallback_pixel_pos(geo);
        }

        let fx = fit.inverse_x.compute_z(rlon, rlat);
        let fy = fit.inverse_y.compute_z(rlon, rlat);
        let (x, y) = self.pixel_transform.invert(fx, fy);
        if self.contains_pixel(x, y) {
            PixelPos::new(x, y)
        } else {
            self.fallback_pixel_pos(geo)
        }
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        self.crossing_meridian_at_180
    }

    fn datum(&self) -> &Arc<Datum> {
        &self.datum
    }

    fn kind(&self) -> GeoCodingKind {
        GeoCodingKind::Gcp
    }

    fn clone_box(&self) -> Box<dyn GeoCoding> {
        Box::new(self.clone())
    }

    fn dispose(&mut self) {
        if let Some(original) = self.original.as_mut() {
            original.dispose();
            debug!("disposed original geocoding of GCP geocoding");
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
