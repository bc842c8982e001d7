//! GPX track extraction.

use std::io::Read;

use anyhow::{Context, Result};
use log::debug;

use crate::geometry::TrackPoint;

/// Extracts the ordered point sequence from a GPX document: every track
/// point (`trk/trkseg/trkpt`) in document order, then every route point
/// (`rte/rtept`). Elevation is carried through when present.
///
/// An empty result is not an error here; callers reject empty tracks
/// before the pipeline runs.
pub fn read_track(reader: impl Read) -> Result<Vec<TrackPoint>> {
    let gpx = gpx::read(std::io::BufReader::new(reader)).context("invalid GPX document")?;

    let mut points = Vec::new();

    for track in &gpx.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                points.push(to_track_point(waypoint));
            }
        }
    }

    for route in &gpx.routes {
        for waypoint in &route.points {
            points.push(to_track_point(waypoint));
        }
    }

    debug!("Parsed {} GPX points", points.len());
    Ok(points)
}

fn to_track_point(waypoint: &gpx::Waypoint) -> TrackPoint {
    let point = waypoint.point();
    TrackPoint {
        lat: point.y(),
        lon: point.x(),
        ele: waypoint.elevation,
    }
}
