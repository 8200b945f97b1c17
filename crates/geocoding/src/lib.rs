//! Pixel/geographic coordinate transformation for raster products.
//!
//! Four geocoding variants share the [`GeoCoding`] trait:
//!
//! - [`TiePointGeoCoding`]: bilinear interpolation of latitude/longitude
//!   tie-point grids, inverted by a warp-seeded Newton search.
//! - [`FxyGeoCoding`]: four global polynomial surfaces.
//! - [`GcpGeoCoding`]: polynomials fitted through ground control points in a
//!   frame rotated to their centroid.
//! - [`CombinedFxyGeoCoding`]: FXY codings tiled over disjoint regions.
//!
//! A [`Scene`] holds the active coding of a raster and transfers it to
//! derived rasters described by a [`SubsetDef`].

pub mod combined;
pub mod config;
pub mod fxy;
pub mod fxy_geocoding;
pub mod gcp;
pub mod geocoding;
pub mod hull;
pub mod rotator;
pub mod scene;
pub mod tie_point;
pub mod tie_point_grid;

pub use combined::{CodingWrapper, CombinedFxyGeoCoding};
pub use config::GeoCodingConfig;
pub use fxy::{FxyOrder, FxySum};
pub use fxy_geocoding::FxyGeoCoding;
pub use gcp::{
    calculate_central_geo_pos, is_segment_crossing_meridian_at_180, Gcp, GcpGeoCoding, GcpMethod,
};
pub use geocoding::{GeoCoding, GeoCodingKind};
pub use rotator::Rotator;
pub use scene::Scene;
pub use tie_point::{
    determine_warp_parameters, determine_warp_tiling, TiePointGeoCoding, WarpParameters,
};
pub use tie_point_grid::{Discontinuity, GridSampler, TiePointGrid};

pub use geo_common::{
    Datum, Ellipsoid, FitError, GeoCodingError, GeoPos, PixelPos, PixelRegion, Result, SubsetDef,
    SwathModel, TiePointData,
};
