//! Minimal raster owner used by the transfer protocol.

use geo_common::SubsetDef;

use crate::geocoding::GeoCoding;

/// A raster of known size holding at most one active geocoding.
///
/// Replacing the geocoding swaps the instance; codings themselves never change.
#[derive(Debug, Clone)]
pub struct Scene {
    width: usize,
    height: usize,
    geo_coding: Option<Box<dyn GeoCoding>>,
}

impl Scene {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            geo_coding: None,
        }
    }

    pub fn with_geo_coding(mut self, geo_coding: Box<dyn GeoCoding>) -> Self {
        self.geo_coding = Some(geo_coding);
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn geo_coding(&self) -> Option<&dyn GeoCoding> {
        self.geo_coding.as_deref()
    }

    pub fn set_geo_coding(&mut self, geo_coding: Box<dyn GeoCoding>) {
        self.geo_coding = Some(geo_coding);
    }

    pub fn take_geo_coding(&mut self) -> Option<Box<dyn GeoCoding>> {
        self.geo_coding.take()
    }

    /// Transfer this scene's geocoding to `dest`, re-parameterised for
    /// `subset`. Returns `false` if there is nothing to transfer or the
    /// coding does not support the subset.
    pub fn transfer_geo_coding_to(&self, dest: &mut Scene, subset: Option<&SubsetDef>) -> bool {
        match &self.geo_coding {
            Some(geo_coding) => geo_coding.transfer_geo_coding(self, dest, subset),
            None => false,
        }
    }
}
