//! Orchestration of the route-to-POI pipeline: simplify, bound, query,
//! fetch, filter.

use std::collections::HashSet;

use chrono::{Datelike, Local, Timelike};
use log::{debug, info};
use thiserror::Error;

use crate::geometry::{self, BoundingBox, TrackPoint};
use crate::overpass::{FetchError, OverpassClient, OverpassConfig, OverpassTransport, build_query};
use crate::poi::{self, ClassifiedPoi, PoiCategory};

/// Central Paris. Dense enough that unfiltered matches drown out the
/// rest of a route, so candidates inside it are dropped outright.
const DEFAULT_EXCLUSION_ZONE: BoundingBox = BoundingBox {
    south: 48.815,
    north: 48.902,
    west: 2.225,
    east: 2.470,
};

#[derive(Debug, Clone)]
pub struct PoiFinderConfig {
    pub overpass: OverpassConfig,
    /// Minimum spacing of the track used for query construction. The
    /// distance filter always runs against the full track.
    pub simplify_interval_m: f64,
    /// Rectangle within which candidates are dropped outright.
    pub exclusion_zone: Option<BoundingBox>,
}

impl Default for PoiFinderConfig {
    fn default() -> Self {
        Self {
            overpass: OverpassConfig::default(),
            simplify_interval_m: 500.0,
            exclusion_zone: Some(DEFAULT_EXCLUSION_ZONE),
        }
    }
}

/// Failures the caller can tell apart: bad input versus exhausted
/// mirrors. An empty result set is a success, not an error.
#[derive(Debug, Error)]
pub enum FindError {
    #[error("no route data: the track contains no points")]
    EmptyTrack,
    #[error("no recognized POI categories requested")]
    NoCategories,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub struct PoiFinder {
    config: PoiFinderConfig,
    client: OverpassClient,
}

impl PoiFinder {
    pub fn new(config: PoiFinderConfig) -> Self {
        let client = OverpassClient::new(config.overpass.clone());
        Self { config, client }
    }

    /// Same pipeline with an injected transport, for tests.
    pub fn with_transport(config: PoiFinderConfig, transport: Box<dyn OverpassTransport>) -> Self {
        let client = OverpassClient::with_transport(config.overpass.clone(), transport);
        Self { config, client }
    }

    /// Finds POIs of the requested categories within `max_detour_m`
    /// meters of the route.
    pub async fn find_along_route(
        &self,
        track: &[TrackPoint],
        max_detour_m: f64,
        categories: &[PoiCategory],
    ) -> Result<Vec<ClassifiedPoi>, FindError> {
        if track.is_empty() {
            return Err(FindError::EmptyTrack);
        }

        let requested: HashSet<PoiCategory> = categories
            .iter()
            .copied()
            .filter(|c| *c != PoiCategory::Unknown)
            .collect();
        if requested.is_empty() {
            return Err(FindError::NoCategories);
        }
        // Deduplicated, in a fixed order for a deterministic query.
        let query_categories: Vec<PoiCategory> = PoiCategory::REQUESTABLE
            .into_iter()
            .filter(|c| requested.contains(c))
            .collect();

        let simplified = geometry::simplify_track(track, self.config.simplify_interval_m);
        debug!(
            "Simplified track from {} to {} points",
            track.len(),
            simplified.len()
        );

        let bbox =
            geometry::bounding_box(&simplified, max_detour_m).ok_or(FindError::EmptyTrack)?;
        let query = build_query(
            &bbox,
            &query_categories,
            self.config.overpass.request_timeout.as_secs(),
        );

        let elements = self.client.fetch(&query).await?;
        info!("Overpass returned {} candidate elements", elements.len());

        let now = Local::now();
        let pois = poi::filter_and_classify(
            elements,
            track,
            max_detour_m,
            &requested,
            self.config.exclusion_zone.as_ref(),
            now.weekday(),
            (now.hour() * 60 + now.minute()) as u16,
        );
        info!(
            "Kept {} POIs within {} m of the route",
            pois.len(),
            max_detour_m
        );

        Ok(pois)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::overpass::RawResponse;

    /// Records the queries it receives and always answers with the same
    /// body.
    struct RecordingTransport {
        body: String,
        queries: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl OverpassTransport for RecordingTransport {
        async fn execute(
            &self,
            _endpoint: &str,
            query: &str,
            _timeout: Duration,
        ) -> Result<RawResponse> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(RawResponse {
                status: 200,
                body: self.body.clone(),
            })
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl OverpassTransport for FailingTransport {
        async fn execute(
            &self,
            _endpoint: &str,
            _query: &str,
            _timeout: Duration,
        ) -> Result<RawResponse> {
            Err(anyhow!("connection refused"))
        }
    }

    fn test_config() -> PoiFinderConfig {
        PoiFinderConfig {
            overpass: OverpassConfig {
                endpoints: vec!["test".to_string()],
                request_timeout: Duration::from_secs(1),
                max_retries: 0,
                rate_limit_backoff: Duration::ZERO,
                retry_backoff: Duration::ZERO,
            },
            simplify_interval_m: 500.0,
            exclusion_zone: None,
        }
    }

    fn paris_track() -> Vec<TrackPoint> {
        vec![
            TrackPoint::new(48.8566, 2.3522),
            TrackPoint::new(48.8606, 2.3376),
        ]
    }

    #[tokio::test]
    async fn test_empty_track_is_rejected() {
        let finder = PoiFinder::with_transport(test_config(), Box::new(FailingTransport));

        let err = finder
            .find_along_route(&[], 500.0, &[PoiCategory::Bakery])
            .await
            .unwrap_err();

        assert!(matches!(err, FindError::EmptyTrack));
    }

    #[tokio::test]
    async fn test_empty_category_set_is_rejected() {
        let finder = PoiFinder::with_transport(test_config(), Box::new(FailingTransport));

        let err = finder
            .find_along_route(&paris_track(), 500.0, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FindError::NoCategories));

        // Unknown alone does not count as a requested category.
        let err = finder
            .find_along_route(&paris_track(), 500.0, &[PoiCategory::Unknown])
            .await
            .unwrap_err();
        assert!(matches!(err, FindError::NoCategories));
    }

    #[tokio::test]
    async fn test_fetch_exhaustion_surfaces_as_fetch_error() {
        let finder = PoiFinder::with_transport(test_config(), Box::new(FailingTransport));

        let err = finder
            .find_along_route(&paris_track(), 500.0, &[PoiCategory::Bakery])
            .await
            .unwrap_err();

        assert!(matches!(err, FindError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_pipeline_filters_fetched_candidates() {
        // One bakery on the route, one ~10 km away.
        let body = r#"{"elements":[
            {"type":"node","id":1,"lat":48.8566,"lon":2.3522,"tags":{"shop":"bakery"}},
            {"type":"node","id":2,"lat":48.76,"lon":2.35,"tags":{"shop":"bakery"}}
        ]}"#;
        let queries = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport {
            body: body.to_string(),
            queries: queries.clone(),
        };
        let finder = PoiFinder::with_transport(test_config(), Box::new(transport));

        let pois = finder
            .find_along_route(&paris_track(), 500.0, &[PoiCategory::Bakery])
            .await
            .unwrap();

        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].id, 1);

        let queries = queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains(r#"node["shop"="bakery"]"#));
        // Only the requested category is queried.
        assert!(!queries[0].contains("drinking_water"));
    }

    #[tokio::test]
    async fn test_empty_result_is_success() {
        let transport = RecordingTransport {
            body: r#"{"elements":[]}"#.to_string(),
            queries: Arc::new(Mutex::new(Vec::new())),
        };
        let finder = PoiFinder::with_transport(test_config(), Box::new(transport));

        let pois = finder
            .find_along_route(&paris_track(), 500.0, &[PoiCategory::Bakery])
            .await
            .unwrap();

        assert!(pois.is_empty());
    }

    #[tokio::test]
    async fn test_default_exclusion_zone_covers_central_paris() {
        let config = PoiFinderConfig::default();
        let zone = config.exclusion_zone.unwrap();

        assert!(zone.contains(48.8566, 2.3522));
        assert!(!zone.contains(47.0, 2.35));
    }
}
