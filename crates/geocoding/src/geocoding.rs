//! The capability surface shared by every geocoding variant.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use geo_common::{Datum, GeoPos, PixelPos, Result, SubsetDef};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::scene::Scene;

/// Discriminates the concrete geocoding behind a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoCodingKind {
    TiePoint,
    Fxy,
    Gcp,
    CombinedFxy,
}

impl fmt::Display for GeoCodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeoCodingKind::TiePoint => "tie-point",
            GeoCodingKind::Fxy => "fxy",
            GeoCodingKind::Gcp => "gcp",
            GeoCodingKind::CombinedFxy => "combined-fxy",
        };
        f.write_str(name)
    }
}

/// Bidirectional mapping between raster pixels and geographic positions.
///
/// Lookups never fail: positions the coding cannot resolve come back with NaN
/// components. Implementations are immutable apart from lazily populated
/// caches, which [`GeoCoding::dispose`] drops again.
pub trait GeoCoding: Send + Sync + fmt::Debug {
    /// Geographic position of a pixel.
    fn get_geo_pos(&self, pixel: PixelPos) -> GeoPos;

    /// Pixel position of a geographic position.
    fn get_pixel_pos(&self, geo: GeoPos) -> PixelPos;

    fn can_get_geo_pos(&self) -> bool {
        true
    }

    fn can_get_pixel_pos(&self) -> bool {
        true
    }

    /// True if the covered area straddles the ±180° meridian.
    fn is_crossing_meridian_at_180(&self) -> bool;

    fn datum(&self) -> &Arc<Datum>;

    fn kind(&self) -> GeoCodingKind;

    /// Independent deep copy, caches included.
    fn clone_box(&self) -> Box<dyn GeoCoding>;

    /// Drop cached inverse-lookup state. Idempotent.
    fn dispose(&mut self);

    /// Re-parameterise this coding for a raster derived through `subset`.
    fn subset(
        &self,
        subset: &SubsetDef,
        dest_width: usize,
        dest_height: usize,
    ) -> Result<Box<dyn GeoCoding>>;

    fn as_any(&self) -> &dyn Any;

    /// Attach a re-parameterised copy of this coding to `dest`.
    ///
    /// A subset region reaching past `src` is clipped to it first. Returns
    /// `false` without touching `dest` when the region misses `src` entirely
    /// or the subset cannot be expressed for this coding.
    fn transfer_geo_coding(
        &self,
        src: &Scene,
        dest: &mut Scene,
        subset: Option<&SubsetDef>,
    ) -> bool {
        let requested = subset.copied().unwrap_or_default();
        let subset = match requested.clipped(src.width(), src.height()) {
            Ok(subset) => subset,
            Err(e) => {
                warn!(kind = %self.kind(), error = %e, "rejected geocoding transfer");
                return false;
            }
        };
        if subset.region != requested.region {
            debug!(
                requested = ?requested.region,
                clipped = ?subset.region,
                "clipped subset region to source"
            );
        }

        match self.subset(&subset, dest.width(), dest.height()) {
            Ok(geo_coding) => {
                debug!(
                    kind = %self.kind(),
                    dest_width = dest.width(),
                    dest_height = dest.height(),
                    "transferred geocoding"
                );
                dest.set_geo_coding(geo_coding);
                true
            }
            Err(e) => {
                warn!(kind = %self.kind(), error = %e, "geocoding transfer failed");
                false
            }
        }
    }
}

impl Clone for Box<dyn GeoCoding> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl<'a> dyn GeoCoding + 'a {
    /// Access the concrete coding behind a trait object.
    pub fn downcast_ref<T: GeoCoding + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}
