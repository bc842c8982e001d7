//! Locates points of interest along a GPS route and reports each match
//! with its distance to the route polyline.
//!
//! The pipeline: reduce the track to a geometrically sufficient subset,
//! compute a padded bounding box, build an Overpass query, run it across
//! redundant mirrors with retry and backoff, then filter the candidates
//! by true distance to the full track, classify them and evaluate their
//! opening hours.

pub mod finder;
pub mod geometry;
pub mod opening_hours;
pub mod overpass;
pub mod poi;
pub mod track_loader;

pub use finder::{FindError, PoiFinder, PoiFinderConfig};
pub use geometry::{BoundingBox, TrackPoint};
pub use opening_hours::OpenState;
pub use poi::{ClassifiedPoi, PoiCategory, PoiStats};
