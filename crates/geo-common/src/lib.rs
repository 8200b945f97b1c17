//! Common value types shared by every geocoding variant.

pub mod datum;
pub mod error;
pub mod metadata;
pub mod position;
pub mod region;
pub mod swath;

pub use datum::{Datum, Ellipsoid};
pub use error::{FitError, GeoCodingError, Result};
pub use metadata::MetadataAccessor;
pub use position::{GeoPos, PixelPos};
pub use region::{PixelRegion, SubsetDef};
pub use swath::{SwathModel, TiePointData};
