//! Geocoding by four global polynomial surfaces.

use std::any::Any;
use std::sync::Arc;

use geo_common::{Datum, GeoCodingError, GeoPos, PixelPos, Result, SubsetDef};
use tracing::debug;

use crate::fxy::FxySum;
use crate::geocoding::{GeoCoding, GeoCodingKind};

/// Polynomial model: pixels are first mapped linearly into model space, then
/// `lat = lat_func(mx, my)` and `lon = lon_func(mx, my)`. The inverse
/// evaluates `pixel_x_func(lat, lon)` and `pixel_y_func(lat, lon)` and undoes
/// the linear map.
#[derive(Debug, Clone, PartialEq)]
pub struct FxyGeoCoding {
    pixel_offset_x: f64,
    pixel_offset_y: f64,
    pixel_size_x: f64,
    pixel_size_y: f64,
    pixel_x_func: FxySum,
    pixel_y_func: FxySum,
    lat_func: FxySum,
    lon_func: FxySum,
    datum: Arc<Datum>,
}

impl FxyGeoCoding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pixel_offset_x: f64,
        pixel_offset_y: f64,
        pixel_size_x: f64,
        pixel_size_y: f64,
        pixel_x_func: FxySum,
        pixel_y_func: FxySum,
        lat_func: FxySum,
        lon_func: FxySum,
        datum: Arc<Datum>,
    ) -> Result<Self> {
        if !(pixel_offset_x.is_finite() && pixel_offset_y.is_finite()) {
            return Err(GeoCodingError::invalid_parameter(
                "pixel_offset",
                "pixel offsets must be finite",
            ));
        }
        for (name, size) in [("pixel_size_x", pixel_size_x), ("pixel_size_y", pixel_size_y)] {
            if !size.is_finite() || size == 0.0 {
                return Err(GeoCodingError::invalid_parameter(
                    name,
                    format!("must be finite and non-zero, got {}", size),
                ));
            }
        }
        Ok(Self {
            pixel_offset_x,
            pixel_offset_y,
            pixel_size_x,
            pixel_size_y,
            pixel_x_func,
            pixel_y_func,
            lat_func,
            lon_func,
            datum,
        })
    }

    pub fn pixel_offset_x(&self) -> f64 {
        self.pixel_offset_x
    }

    pub fn pixel_offset_y(&self) -> f64 {
        self.pixel_offset_y
    }

    pub fn pixel_size_x(&self) -> f64 {
        self.pixel_size_x
    }

    pub fn pixel_size_y(&self) -> f64 {
        self.pixel_size_y
    }

    pub fn pixel_x_func(&self) -> &FxySum {
        &self.pixel_x_func
    }

    pub fn pixel_y_func(&self) -> &FxySum {
        &self.pixel_y_func
    }

    pub fn lat_func(&self) -> &FxySum {
        &self.lat_func
    }

    pub fn lon_func(&self) -> &FxySum {
        &self.lon_func
    }

    /// Re-parameterise for a raster derived through `subset`.
    ///
    /// Only the linear pixel transform changes; the surfaces live in model
    /// space and are copied as they are.
    pub fn transfer(&self, subset: &SubsetDef) -> Result<FxyGeoCoding> {
        if subset.sub_sampling_x == 0 || subset.sub_sampling_y == 0 {
            return Err(GeoCodingError::unsupported_subset(
                "sub-sampling factors must be >= 1",
            ));
        }
        let (rx, ry) = subset.origin();
        debug!(
            origin_x = rx,
            origin_y = ry,
            step_x = subset.sub_sampling_x,
            step_y = subset.sub_sampling_y,
            "transferring FXY geocoding"
        );
        Self::new(
            self.pixel_offset_x + rx * self.pixel_size_x,
            self.pixel_offset_y + ry * self.pixel_size_y,
            self.pixel_size_x * subset.sub_sampling_x as f64,
            self.pixel_size_y * subset.sub_sampling_y as f64,
            self.pixel_x_func.clone(),
            self.pixel_y_func.clone(),
            self.lat_func.clone(),
            self.lon_func.clone(),
            Arc::clone(&self.datum),
        )
    }
}

impl GeoCoding for FxyGeoCoding {
    fn get_geo_pos(&self, pixel: PixelPos) -> GeoPos {
        if !pixel.is_valid() {
            return GeoPos::invalid();
        }
        let mx = pixel.x * self.pixel_size_x + self.pixel_offset_x;
        let my = pixel.y * self.pixel_size_y + self.pixel_offset_y;
        GeoPos::new(
            self.lat_func.compute_z(mx, my),
            self.lon_func.compute_z(mx, my),
        )
    }

    fn get_pixel_pos(&self, geo: GeoPos) -> PixelPos {
        if !geo.is_valid() {
            return PixelPos::invalid();
        }
        let px = self.pixel_x_func.compute_z(geo.lat, geo.lon);
        let py = self.pixel_y_func.compute_z(geo.lat, geo.lon);
        PixelPos::new(
            (px - self.pixel_offset_x) / self.pixel_size_x,
            (py - self.pixel_offset_y) / self.pixel_size_y,
        )
    }

    /// No raster extent is attached to the model, so a crossing cannot be
    /// determined.
    fn is_crossing_meridian_at_180(&self) -> bool {
        false
    }

    fn datum(&self) -> &Arc<Datum> {
        &self.datum
    }

    fn kind(&self) -> GeoCodingKind {
        GeoCodingKind::Fxy
    }

    fn clone_box(&self) -> Box<dyn GeoCoding> {
        Box::new(self.clone())
    }

    fn dispose(&mut self) {}

    fn subset(
        &self,
        subset: &SubsetDef,
        _dest_width: usize,
        _dest_height: usize,
    ) -> Result<Box<dyn GeoCoding>> {
        Ok(Box::new(self.transfer(subset)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_common::PixelRegion;

    fn identity_coding() -> FxyGeoCoding {
        FxyGeoCoding::new(
            0.0,
            0.0,
            1.0,
            1.0,
            FxySum::linear([0.0, 0.0, 1.0]),
            FxySum::linear([0.0, 1.0, 0.0]),
            FxySum::linear([0.0, 0.0, 1.0]),
            FxySum::linear([0.0, 1.0, 0.0]),
            Datum::wgs84(),
        )
        .unwrap()
    }

    #[test]
    fn test_reverse_is_inverse_of_forward() {
        let coding = identity_coding();
        let pixel = PixelPos::new(12.5, 349.1);
        let back = coding.get_pixel_pos(coding.get_geo_pos(pixel));
        assert!((back.x - pixel.x).abs() < 1e-8);
        assert!((back.y - pixel.y).abs() < 1e-8);
    }

    #[test]
    fn test_known_positions() {
        let coding = identity_coding();
        let geo = coding.get_geo_pos(PixelPos::new(13.0, 21.0));
        assert_eq!(geo.lon, 13.0);
        assert_eq!(geo.lat, 21.0);

        let pixel = coding.get_pixel_pos(GeoPos::new(51.3, 3.445));
        assert_eq!(pixel.x, 3.445);
        assert_eq!(pixel.y, 51.3);
    }

    #[test]
    fn test_rejects_zero_pixel_size() {
        let f = FxySum::linear([0.0, 1.0, 0.0]);
        let result = FxyGeoCoding::new(
            0.0,
            0.0,
            0.0,
            1.0,
            f.clone(),
            f.clone(),
            f.clone(),
            f,
            Datum::wgs84(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_transfer_rescales_pixel_transform() {
        let coding = identity_coding();
        let subset = SubsetDef::new()
            .with_region(PixelRegion::new(10, 10, 50, 50))
            .with_sub_sampling(2, 3);
        let derived = coding.transfer(&subset).unwrap();

        assert_eq!(derived.pixel_offset_x(), 10.0);
        assert_eq!(derived.pixel_offset_y(), 10.0);
        assert_eq!(derived.pixel_size_x(), 2.0);
        assert_eq!(derived.pixel_size_y(), 3.0);
        assert_eq!(derived.lat_func().coefficients(), coding.lat_func().coefficients());
        assert_eq!(derived.lon_func().coefficients(), coding.lon_func().coefficients());
        assert_eq!(derived.pixel_x_func(), coding.pixel_x_func());
        assert_eq!(derived.pixel_y_func(), coding.pixel_y_func());

        // derived pixel (1, 1) is source pixel (12, 13)
        let src = coding.get_geo_pos(PixelPos::new(12.0, 13.0));
        let dst = derived.get_geo_pos(PixelPos::new(1.0, 1.0));
        assert_eq!(src, dst);
    }

    #[test]
    fn test_nan_propagates() {
        let coding = identity_coding();
        let geo = coding.get_geo_pos(PixelPos::new(f64::NAN, 1.0));
        assert!(geo.lat.is_nan() && geo.lon.is_nan());
        assert!(!coding.get_pixel_pos(GeoPos::invalid()).is_valid());
    }
}
