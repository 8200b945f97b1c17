//! Geocoding composed of FXY codings over disjoint raster regions.

use std::any::Any;
use std::sync::Arc;

use geo_common::{Datum, GeoCodingError, GeoPos, PixelPos, PixelRegion, Result, SubsetDef};
use tracing::debug;

use crate::fxy_geocoding::FxyGeoCoding;
use crate::geocoding::{GeoCoding, GeoCodingKind};

/// An FXY coding responsible for one rectangular region of the raster. The
/// delegate works in pixels relative to the region origin.
#[derive(Debug, Clone, PartialEq)]
pub struct CodingWrapper {
    geo_coding: FxyGeoCoding,
    region: PixelRegion,
}

impl CodingWrapper {
    pub fn new(geo_coding: FxyGeoCoding, region: PixelRegion) -> Self {
        Self { geo_coding, region }
    }

    pub fn geo_coding(&self) -> &FxyGeoCoding {
        &self.geo_coding
    }

    pub fn region(&self) -> PixelRegion {
        self.region
    }
}

/// Geocoding that dispatches to the wrapper whose region holds the pixel.
#[derive(Debug, Clone)]
pub struct CombinedFxyGeoCoding {
    wrappers: Vec<CodingWrapper>,
    bounds: PixelRegion,
    datum: Arc<Datum>,
}

impl CombinedFxyGeoCoding {
    /// Combine wrappers whose regions tile a rectangle anchored at (0, 0).
    pub fn new(wrappers: Vec<CodingWrapper>) -> Result<Self> {
        let bounds = validate_tiling(&wrappers)?;
        let datum = Arc::clone(wrappers[0].geo_coding.datum());
        debug!(
            wrappers = wrappers.len(),
            width = bounds.width,
            height = bounds.height,
            "created combined FXY geocoding"
        );
        Ok(Self {
            wrappers,
            bounds,
            datum,
        })
    }

    pub fn wrappers(&self) -> &[CodingWrapper] {
        &self.wrappers
    }

    /// Union of all wrapper regions.
    pub fn bounds(&self) -> PixelRegion {
        self.bounds
    }

    /// Re-parameterise for a raster derived through `subset`.
    ///
    /// Every region is clipped to the subset and mapped into derived pixels;
    /// regions that vanish are dropped. Each delegate's pixel transform is
    /// shifted so the derived region origin lands on the same source pixel.
    pub fn transfer(&self, subset: &SubsetDef) -> Result<CombinedFxyGeoCoding> {
        let (step_x, step_y) = (subset.sub_sampling_x, subset.sub_sampling_y);
        if step_x == 0 || step_y == 0 {
            return Err(GeoCodingError::unsupported_subset(
                "sub-sampling factors must be >= 1",
            ));
        }
        let area = subset.region_or_full(self.bounds.width, self.bounds.height);

        let mut wrappers = Vec::with_capacity(self.wrappers.len());
        for wrapper in &self.wrappers {
            let Some(clipped) = wrapper.region.intersection(&area) else {
                continue;
            };
            let x0 = (clipped.x - area.x).div_ceil(step_x);
            let y0 = (clipped.y - area.y).div_ceil(step_y);
            let x1 = (clipped.right() - area.x).div_ceil(step_x);
            let y1 = (clipped.bottom() - area.y).div_ceil(step_y);
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            let region = PixelRegion::new(x0, y0, x1 - x0, y1 - y0);

            // source pixel of the derived region origin, relative to the old region
            let shift_x = (area.x + x0 * step_x - wrapper.region.x) as f64;
            let shift_y = (area.y + y0 * step_y - wrapper.region.y) as f64;
            let delegate = &wrapper.geo_coding;
            let geo_coding = FxyGeoCoding::new(
                delegate.pixel_offset_x() + shift_x * delegate.pixel_size_x(),
                delegate.pixel_offset_y() + shift_y * delegate.pixel_size_y(),
                delegate.pixel_size_x() * step_x as f64,
                delegate.pixel_size_y() * step_y as f64,
                delegate.pixel_x_func().clone(),
                delegate.pixel_y_func().clone(),
                delegate.lat_func().clone(),
                delegate.lon_func().clone(),
                Arc::clone(delegate.datum()),
            )?;
            wrappers.push(CodingWrapper::new(geo_coding, region));
        }

        if wrappers.is_empty() {
            return Err(GeoCodingError::unsupported_subset(format!(
                "subset {:?} does not overlap any region",
                area
            )));
        }
        debug!(
            ?area,
            step_x,
            step_y,
            kept = wrappers.len(),
            dropped = self.wrappers.len() - wrappers.len(),
            "transferring combined FXY geocoding"
        );
        Self::new(wrappers)
    }
}

impl GeoCoding for CombinedFxyGeoCoding {
    fn get_geo_pos(&self, pixel: PixelPos) -> GeoPos {
        if !pixel.is_valid() {
            return GeoPos::invalid();
        }
        self.wrappers
            .iter()
            .find(|w| w.region.contains(pixel.x, pixel.y))
            .map_or_else(GeoPos::invalid, |w| {
                w.geo_coding.get_geo_pos(PixelPos::new(
                    pixel.x - w.region.x as f64,
                    pixel.y - w.region.y as f64,
                ))
            })
    }

    fn get_pixel_pos(&self, geo: GeoPos) -> PixelPos {
        if !geo.is_valid() {
            return PixelPos::invalid();
        }
        self.wrappers
            .iter()
            .map(|w| {
                let local = w.geo_coding.get_pixel_pos(geo);
                (
                    w,
                    PixelPos::new(local.x + w.region.x as f64, local.y + w.region.y as f64),
                )
            })
            .find(|(w, pixel)| pixel.is_valid() && w.region.contains(pixel.x, pixel.y))
            .map_or_else(PixelPos::invalid, |(_, pixel)| pixel)
    }

    fn is_crossing_meridian_at_180(&self) -> bool {
        self.wrappers
            .iter()
            .any(|w| w.geo_coding.is_crossing_meridian_at_180())
    }

    fn datum(&self) -> &Arc<Datum> {
        &self.datum
    }

    fn kind(&self) -> GeoCodingKind {
        GeoCodingKind::CombinedFxy
    }

    fn clone_box(&self) -> Box<dyn GeoCoding> {
        Box::new(self.clone())
    }

    fn dispose(&mut self) {
        for wrapper in &mut self.wrappers {
            wrapper.geo_coding.dispose();
        }
    }

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

/// Check that the regions are non-empty, pairwise disjoint and exactly tile
/// their bounding box, which must start at (0, 0). Returns the bounding box.
fn validate_tiling(wrappers: &[CodingWrapper]) -> Result<PixelRegion> {
    let Some(first) = wrappers.first() else {
        return Err(GeoCodingError::configuration(
            "combined geocoding needs at least one region",
        ));
    };

    let mut bounds = first.region;
    let mut area = 0usize;
    for (k, wrapper) in wrappers.iter().enumerate() {
        let region = wrapper.region;
        if region.is_empty() {
            return Err(GeoCodingError::configuration(format!(
                "region {} is empty: {:?}",
                k, region
            )));
        }
        for (l, other) in wrappers.iter().enumerate().skip(k + 1) {
            if region.intersects(&other.region) {
                return Err(GeoCodingError::configuration(format!(
                    "regions {} and {} overlap",
                    k, l
                )));
            }
        }
        bounds = bounds.union(&region);
        area += region.area();
    }

    if bounds.x != 0 || bounds.y != 0 {
        return Err(GeoCodingError::configuration(format!(
            "regions must start at (0, 0), bounding box is {:?}",
            bounds
        )));
    }
    if area != bounds.area() {
        return Err(GeoCodingError::configuration(format!(
            "regions leave gaps: they cover {} of {} pixels",
            area,
            bounds.area()
        )));
    }
    Ok(bounds)
}
