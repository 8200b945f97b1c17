//! Geocoding builders shared by the integration tests.

#![allow(dead_code)]

use geocoding::{
    CodingWrapper, CombinedFxyGeoCoding, Datum, FxyGeoCoding, FxySum, Gcp, GcpGeoCoding,
    GcpMethod, GeoPos, PixelPos, PixelRegion, TiePointGeoCoding, TiePointGrid,
};
use test_utils::SwathModel;

pub fn tie_point_coding(model: &SwathModel, sub_sampling: usize) -> TiePointGeoCoding {
    let (lat, lon) = TiePointGrid::lat_lon_from(&model.tie_points(sub_sampling)).unwrap();
    TiePointGeoCoding::new(lat, lon).unwrap()
}

pub fn gcps_from(points: &[[f64; 4]]) -> Vec<Gcp> {
    points
        .iter()
        .map(|p| Gcp::new(PixelPos::new(p[0], p[1]), GeoPos::new(p[2], p[3])))
        .collect()
}

pub fn gcp_coding(model: &SwathModel, method: GcpMethod) -> GcpGeoCoding {
    GcpGeoCoding::new(
        method,
        gcps_from(&model.gcps(5, 7)),
        model.width,
        model.height,
        Datum::wgs84(),
    )
    .unwrap()
}

/// lat = 50 - 0.01 y, lon = 5 + 0.02 x, with exact inverse surfaces.
pub fn fxy_coding() -> FxyGeoCoding {
    FxyGeoCoding::new(
        0.0,
        0.0,
        1.0,
        1.0,
        FxySum::linear([-250.0, 0.0, 50.0]),
        FxySum::linear([5000.0, -100.0, 0.0]),
        FxySum::linear([50.0, 0.0, -0.01]),
        FxySum::linear([5.0, 0.02, 0.0]),
        Datum::wgs84(),
    )
    .unwrap()
}

/// Two FXY codings side by side over a 20 x 10 raster; the right one is
/// shifted by its region origin so the combination is seamless.
pub fn combined_coding() -> CombinedFxyGeoCoding {
    let left = fxy_coding();
    let right = FxyGeoCoding::new(
        10.0,
        0.0,
        1.0,
        1.0,
        left.pixel_x_func().clone(),
        left.pixel_y_func().clone(),
        left.lat_func().clone(),
        left.lon_func().clone(),
        Datum::wgs84(),
    )
    .unwrap();
    CombinedFxyGeoCoding::new(vec![
        CodingWrapper::new(left, PixelRegion::new(0, 0, 10, 10)),
        CodingWrapper::new(right, PixelRegion::new(10, 0, 10, 10)),
    ])
    .unwrap()
}
