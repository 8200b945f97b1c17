//! Pixel regions and subset descriptors.

use serde::{Deserialize, Serialize};

use crate::error::{GeoCodingError, Result};

/// An axis-aligned rectangle of whole pixels.
///
/// Containment is half-open: a region at `x` with `width` covers pixel
/// coordinates in `[x, x + width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRegion {
    /// Create a new region from its origin and size.
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check if a pixel position lies within this region.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x as f64 && x < self.right() as f64 && y >= self.y as f64 && y < self.bottom() as f64
    }

    /// Check if this region overlaps another.
    pub fn intersects(&self, other: &PixelRegion) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Compute the intersection of two regions.
    pub fn intersection(&self, other: &PixelRegion) -> Option<PixelRegion> {
        if !self.intersects(other) {
            return None;
        }

        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        Some(PixelRegion {
            x,
            y,
            width: self.right().min(other.right()) - x,
            height: self.bottom().min(other.bottom()) - y,
        })
    }

    /// Smallest region containing both.
    pub fn union(&self, other: &PixelRegion) -> PixelRegion {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        PixelRegion {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

/// Describes how a derived raster was cut from its source.
///
/// Derived pixel `(x, y)` corresponds to source pixel
/// `(region.x + x * sub_sampling_x, region.y + y * sub_sampling_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetDef {
    /// Source region; `None` means the whole source raster.
    pub region: Option<PixelRegion>,
    pub sub_sampling_x: usize,
    pub sub_sampling_y: usize,
}

impl Default for SubsetDef {
    fn default() -> Self {
        Self {
            region: None,
            sub_sampling_x: 1,
            sub_sampling_y: 1,
        }
    }
}

impl SubsetDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: PixelRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_sub_sampling(mut self, sub_sampling_x: usize, sub_sampling_y: usize) -> Self {
        self.sub_sampling_x = sub_sampling_x;
        self.sub_sampling_y = sub_sampling_y;
        self
    }

    /// Validate the subset against a source raster size.
    pub fn validate(&self, source_width: usize, source_height: usize) -> Result<()> {
        self.clipped(source_width, source_height).map(|_| ())
    }

    /// This subset with its region clipped to the source raster.
    ///
    /// A region reaching past the raster is cut back to the overlap; only a
    /// region with no overlap at all is rejected.
    pub fn clipped(&self, source_width: usize, source_height: usize) -> Result<SubsetDef> {
        if self.sub_sampling_x == 0 || self.sub_sampling_y == 0 {
            return Err(GeoCodingError::invalid_parameter(
                "sub_sampling",
                "sub-sampling factors must be >= 1",
            ));
        }
        let Some(region) = self.region else {
            return Ok(*self);
        };
        if region.is_empty() {
            return Err(GeoCodingError::invalid_parameter("region", "region is empty"));
        }
        let source = PixelRegion::new(0, 0, source_width, source_height);
        match region.intersection(&source) {
            Some(clipped) => Ok(SubsetDef {
                region: Some(clipped),
                ..*self
            }),
            None => Err(GeoCodingError::invalid_parameter(
                "region",
                format!(
                    "region {:?} does not overlap source raster {}x{}",
                    region, source_width, source_height
                ),
            )),
        }
    }

    /// The source region, defaulting to the full source raster.
    pub fn region_or_full(&self, source_width: usize, source_height: usize) -> PixelRegion {
        self.region
            .unwrap_or_else(|| PixelRegion::new(0, 0, source_width, source_height))
    }

    /// Size of the derived raster.
    pub fn derived_size(&self, source_width: usize, source_height: usize) -> (usize, usize) {
        let region = self.region_or_full(source_width, source_height);
        (
            region.width.div_ceil(self.sub_sampling_x.max(1)),
            region.height.div_ceil(self.sub_sampling_y.max(1)),
        )
    }

    /// Origin of the source region as floating point offsets.
    pub fn origin(&self) -> (f64, f64) {
        self.region
            .map(|r| (r.x as f64, r.y as f64))
            .unwrap_or((0.0, 0.0))
    }

    /// True if the subset neither crops nor sub-samples.
    pub fn is_identity(&self) -> bool {
        self.origin() == (0.0, 0.0) && self.sub_sampling_x == 1 && self.sub_sampling_y == 1
    }
}
