use geo::{Haversine, algorithm::Distance};
use geo_types::Point;
use serde::{Deserialize, Serialize};

/// One point of a GPS route. Order within a track is significant:
/// consecutive points define the route polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub ele: Option<f64>,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ele: None,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Axis-aligned geographic rectangle. Always `south <= north` and
/// `west <= east` when produced by [`bounding_box`]; the antimeridian is
/// not handled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }
}

/// Reduces a track to points spaced at least `min_interval_m` apart.
///
/// Greedy fixed-step filter, not a shape-preserving simplifier: a point
/// survives if it lies at least the interval away from the last kept
/// point. The first and last points are always kept, so the final pair
/// may be closer than the interval. Used to bound query construction
/// cost only; distance filtering always runs against the full track.
pub fn simplify_track(points: &[TrackPoint], min_interval_m: f64) -> Vec<TrackPoint> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut simplified = vec![points[0]];
    let mut last_kept = points[0];

    for point in &points[1..points.len() - 1] {
        if Haversine.distance(last_kept.point(), point.point()) >= min_interval_m {
            simplified.push(*point);
            last_kept = *point;
        }
    }

    simplified.push(points[points.len() - 1]);
    simplified
}

/// Axis-aligned bounding box of a track, expanded by `buffer_m` converted
/// from meters to degrees. Returns `None` for an empty track.
///
/// The conversion assumes 111 km per degree of latitude and scales the
/// longitude buffer by the cosine of the mean latitude. Not valid near
/// the poles; no correction is applied there.
pub fn bounding_box(points: &[TrackPoint], buffer_m: f64) -> Option<BoundingBox> {
    if points.is_empty() {
        return None;
    }

    let mut min_lat = f64::INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut min_lon = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;

    for point in points {
        min_lat = min_lat.min(point.lat);
        max_lat = max_lat.max(point.lat);
        min_lon = min_lon.min(point.lon);
        max_lon = max_lon.max(point.lon);
    }

    let lat_buffer = buffer_m / 111_000.0;
    let mean_lat = (min_lat + max_lat) / 2.0;
    let lon_buffer = buffer_m / (111_000.0 * mean_lat.to_radians().cos());

    Some(BoundingBox {
        south: min_lat - lat_buffer,
        north: max_lat + lat_buffer,
        west: min_lon - lon_buffer,
        east: max_lon + lon_buffer,
    })
}

/// Distance in meters from `p` to the segment between `a` and `b`.
///
/// The nearest point on the segment comes from a planar projection on raw
/// degree coordinates, clamped to the segment; the returned value is the
/// haversine distance to that clamped point. Downstream detour thresholds
/// are tuned against this planar/geodesic mix, so it must not be replaced
/// with a full geodesic projection.
pub fn point_to_segment_distance(p: Point<f64>, a: Point<f64>, b: Point<f64>) -> f64 {
    let dx = b.x() - a.x();
    let dy = b.y() - a.y();
    let len_sq = dx * dx + dy * dy;

    // A zero-length segment degenerates to the distance to its endpoint.
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x() - a.x()) * dx + (p.y() - a.y()) * dy) / len_sq).clamp(0.0, 1.0)
    };

    let projected = Point::new(a.x() + t * dx, a.y() + t * dy);
    Haversine.distance(p, projected)
}

/// Minimum distance in meters from a location to the route polyline,
/// taken over every consecutive pair of track points. A single-point
/// track degenerates to the distance to that point.
pub fn min_distance_to_track(lat: f64, lon: f64, track: &[TrackPoint]) -> f64 {
    let p = Point::new(lon, lat);

    if track.len() == 1 {
        return Haversine.distance(p, track[0].point());
    }

    track
        .windows(2)
        .map(|pair| point_to_segment_distance(p, pair[0].point(), pair[1].point()))
        .fold(f64::INFINITY, f64::min)
}
