//! Configuration for geocoding numerics.
//!
//! Thresholds that decide crossing detection, warp seeding and fit
//! conditioning are kept here rather than hard-coded in each coding.

use geo_common::{GeoCodingError, MetadataAccessor, Result};
use serde::{Deserialize, Serialize};

/// Numeric tuning shared by all geocoding variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoCodingConfig {
    /// A longitude jump between neighbouring samples larger than
    /// `180 - meridian_epsilon_deg` is treated as an antimeridian crossing.
    pub meridian_epsilon_deg: f64,

    /// Upper bound on the number of tie points sampled when fitting the
    /// inverse warp polynomial.
    pub warp_max_points: usize,

    /// Maximum Newton iterations when inverting a tie-point grid.
    pub newton_max_iterations: usize,

    /// Newton convergence threshold in grid cells.
    pub newton_tolerance: f64,

    /// Relative singular value threshold below which a least-squares design
    /// matrix is considered rank deficient.
    pub fit_rank_tolerance: f64,

    /// Pixel step used when walking a GCP raster boundary.
    pub gcp_boundary_step: usize,
}

impl Default for GeoCodingConfig {
    fn default() -> Self {
        Self {
            meridian_epsilon_deg: 1.0e-6,
            warp_max_points: 1000,
            newton_max_iterations: 30,
            newton_tolerance: 1.0e-6,
            fit_rank_tolerance: 1.0e-12,
            gcp_boundary_step: 16,
        }
    }
}

impl GeoCodingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GEOCODING_MERIDIAN_EPSILON_DEG") {
            if let Ok(eps) = val.parse() {
                config.meridian_epsilon_deg = eps;
            }
        }

        if let Ok(val) = std::env::var("GEOCODING_WARP_MAX_POINTS") {
            if let Ok(points) = val.parse() {
                config.warp_max_points = points;
            }
        }

        if let Ok(val) = std::env::var("GEOCODING_NEWTON_MAX_ITERATIONS") {
            if let Ok(iterations) = val.parse() {
                config.newton_max_iterations = iterations;
            }
        }

        if let Ok(val) = std::env::var("GEOCODING_NEWTON_TOLERANCE") {
            if let Ok(tolerance) = val.parse() {
                config.newton_tolerance = tolerance;
            }
        }

        if let Ok(val) = std::env::var("GEOCODING_FIT_RANK_TOLERANCE") {
            if let Ok(tolerance) = val.parse() {
                config.fit_rank_tolerance = tolerance;
            }
        }

        if let Ok(val) = std::env::var("GEOCODING_GCP_BOUNDARY_STEP") {
            if let Ok(step) = val.parse() {
                config.gcp_boundary_step = step;
            }
        }

        config
    }

    /// Apply overrides found in product metadata.
    pub fn from_metadata(metadata: &dyn MetadataAccessor) -> Self {
        let mut config = Self::default();
        if let Some(eps) = metadata.get_f64("geocoding.meridian_epsilon_deg") {
            config.meridian_epsilon_deg = eps;
        }
        if let Some(points) = metadata.get_usize("geocoding.warp_max_points") {
            config.warp_max_points = points;
        }
        if let Some(iterations) = metadata.get_usize("geocoding.newton_max_iterations") {
            config.newton_max_iterations = iterations;
        }
        if let Some(tolerance) = metadata.get_f64("geocoding.newton_tolerance") {
            config.newton_tolerance = tolerance;
        }
        if let Some(tolerance) = metadata.get_f64("geocoding.fit_rank_tolerance") {
            config.fit_rank_tolerance = tolerance;
        }
        if let Some(step) = metadata.get_usize("geocoding.gcp_boundary_step") {
            config.gcp_boundary_step = step;
        }
        config
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..180.0).contains(&self.meridian_epsilon_deg) {
            return Err(GeoCodingError::invalid_parameter(
                "meridian_epsilon_deg",
                "must be in [0, 180)",
            ));
        }

        if self.warp_max_points < 4 {
            return Err(GeoCodingError::invalid_parameter(
                "warp_max_points",
                "must be >= 4",
            ));
        }

        if self.newton_max_iterations == 0 {
            return Err(GeoCodingError::invalid_parameter(
                "newton_max_iterations",
                "must be > 0",
            ));
        }

        if !(self.newton_tolerance > 0.0) {
            return Err(GeoCodingError::invalid_parameter(
                "newton_tolerance",
                "must be > 0",
            ));
        }

        if !(self.fit_rank_tolerance > 0.0 && self.fit_rank_tolerance < 1.0) {
            return Err(GeoCodingError::invalid_parameter(
                "fit_rank_tolerance",
                "must be in (0, 1)",
            ));
        }

        if self.gcp_boundary_step == 0 {
            return Err(GeoCodingError::invalid_parameter(
                "gcp_boundary_step",
                "must be > 0",
            ));
        }

        Ok(())
    }

    /// Threshold above which a longitude step counts as a crossing.
    pub fn crossing_threshold(&self) -> f64 {
        180.0 - self.meridian_epsilon_deg
    }
}
