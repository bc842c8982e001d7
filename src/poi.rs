//! POI categories, classification and distance filtering.

use std::collections::{HashMap, HashSet};

use chrono::Weekday;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, TrackPoint, min_distance_to_track};
use crate::opening_hours::{self, OpenState};
use crate::overpass::OverpassElement;

/// The recognized POI categories. `Unknown` is what classification falls
/// back to; it is never requestable and never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiCategory {
    Bakery,
    Cafe,
    Water,
    Toilets,
    Hotel,
    Unknown,
}

impl PoiCategory {
    /// The requestable whitelist. Callers must restrict requested
    /// categories to this set before they reach the core.
    pub const REQUESTABLE: [PoiCategory; 5] = [
        PoiCategory::Bakery,
        PoiCategory::Cafe,
        PoiCategory::Water,
        PoiCategory::Toilets,
        PoiCategory::Hotel,
    ];

    /// Overpass clause selecting this category, before bounding-box
    /// scoping. `None` for `Unknown`, which can never be queried.
    pub fn overpass_clause(self) -> Option<&'static str> {
        match self {
            PoiCategory::Bakery => Some(r#"node["shop"="bakery"]"#),
            PoiCategory::Cafe => Some(r#"node["amenity"~"cafe|bar|pub"]"#),
            PoiCategory::Water => Some(r#"node["amenity"="drinking_water"]"#),
            PoiCategory::Toilets => Some(r#"node["amenity"="toilets"]"#),
            PoiCategory::Hotel => Some(r#"node["tourism"~"hotel|hostel|guest_house"]"#),
            PoiCategory::Unknown => None,
        }
    }

    /// Classifies a tag set. The first matching predicate wins; the
    /// order is fixed and independent of what the caller requested.
    pub fn classify(tags: &HashMap<String, String>) -> PoiCategory {
        let amenity = tags.get("amenity").map(String::as_str);
        let tourism = tags.get("tourism").map(String::as_str);

        if tags.get("shop").map(String::as_str) == Some("bakery") {
            PoiCategory::Bakery
        } else if matches!(amenity, Some("cafe" | "bar" | "pub")) {
            PoiCategory::Cafe
        } else if amenity == Some("drinking_water") {
            PoiCategory::Water
        } else if amenity == Some("toilets") {
            PoiCategory::Toilets
        } else if matches!(tourism, Some("hotel" | "hostel" | "guest_house")) {
            PoiCategory::Hotel
        } else {
            PoiCategory::Unknown
        }
    }
}

impl std::str::FromStr for PoiCategory {
    type Err = String;

    // "unknown" is deliberately not accepted: only the whitelist parses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bakery" => Ok(PoiCategory::Bakery),
            "cafe" => Ok(PoiCategory::Cafe),
            "water" => Ok(PoiCategory::Water),
            "toilets" => Ok(PoiCategory::Toilets),
            "hotel" => Ok(PoiCategory::Hotel),
            other => Err(format!("unrecognized POI category: {}", other)),
        }
    }
}

/// Display name used when the source has no usable `name` tag.
fn default_name(tags: &HashMap<String, String>) -> &'static str {
    let amenity = tags.get("amenity").map(String::as_str);

    if tags.get("shop").map(String::as_str) == Some("bakery") {
        "Boulangerie"
    } else if amenity == Some("cafe") {
        "Café"
    } else if amenity == Some("bar") {
        "Bar"
    } else if amenity == Some("pub") {
        "Pub"
    } else if amenity == Some("drinking_water") {
        "Point d'eau"
    } else if amenity == Some("toilets") {
        "Toilettes"
    } else if matches!(
        tags.get("tourism").map(String::as_str),
        Some("hotel" | "hostel" | "guest_house")
    ) {
        "Hôtel"
    } else {
        "POI"
    }
}

/// A candidate that survived every gate: recognized category that was
/// requested, close enough to the route, outside the exclusion zone.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedPoi {
    pub id: u64,
    pub lat: f64,
    pub lon: f64,
    pub category: PoiCategory,
    pub name: String,
    /// Minimum distance to the route polyline, rounded to whole meters.
    pub distance_m: u32,
    pub tags: HashMap<String, String>,
    pub open_now: OpenState,
}

/// Filters raw candidates down to classified POIs.
///
/// Distances are computed against the full track, never a simplified
/// one. Candidates are independent, so the track-by-candidate scan runs
/// in parallel; output order follows input order.
pub fn filter_and_classify(
    elements: Vec<OverpassElement>,
    track: &[TrackPoint],
    max_distance_m: f64,
    requested: &HashSet<PoiCategory>,
    exclusion_zone: Option<&BoundingBox>,
    weekday: Weekday,
    minute_of_day: u16,
) -> Vec<ClassifiedPoi> {
    elements
        .into_par_iter()
        .filter_map(|element| {
            if element.element_type != "node" {
                return None;
            }
            if exclusion_zone.is_some_and(|zone| zone.contains(element.lat, element.lon)) {
                return None;
            }

            // Categorization and request filtering are separate gates: a
            // candidate keeps the category its tags imply, and is dropped
            // when that category was not requested.
            let category = PoiCategory::classify(&element.tags);
            if category == PoiCategory::Unknown || !requested.contains(&category) {
                return None;
            }

            let distance = min_distance_to_track(element.lat, element.lon, track);
            if distance > max_distance_m {
                return None;
            }

            let open_now = match element.tags.get("opening_hours") {
                Some(raw) => opening_hours::evaluate_at(raw, weekday, minute_of_day),
                None => OpenState::Unknown,
            };

            let name = element
                .tags
                .get("name")
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| default_name(&element.tags).to_string());

            Some(ClassifiedPoi {
                id: element.id,
                lat: element.lat,
                lon: element.lon,
                category,
                name,
                distance_m: distance.round() as u32,
                tags: element.tags,
                open_now,
            })
        })
        .collect()
}

/// Per-category result counts for reporting.
#[derive(Debug, Default, Serialize)]
pub struct PoiStats {
    pub total: usize,
    pub bakeries: usize,
    pub cafes: usize,
    pub water_points: usize,
    pub toilets: usize,
    pub hotels: usize,
}

impl PoiStats {
    pub fn from_pois(pois: &[ClassifiedPoi]) -> Self {
        let mut stats = PoiStats {
            total: pois.len(),
            ..Default::default()
        };
        for poi in pois {
            match poi.category {
                PoiCategory::Bakery => stats.bakeries += 1,
                PoiCategory::Cafe => stats.cafes += 1,
                PoiCategory::Water => stats.water_points += 1,
                PoiCategory::Toilets => stats.toilets += 1,
                PoiCategory::Hotel => stats.hotels += 1,
                PoiCategory::Unknown => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(id: u64, lat: f64, lon: f64, t: HashMap<String, String>) -> OverpassElement {
        OverpassElement {
            element_type: "node".to_string(),
            id,
            lat,
            lon,
            tags: t,
        }
    }

    fn paris_track() -> Vec<TrackPoint> {
        vec![
            TrackPoint::new(48.8566, 2.3522),
            TrackPoint::new(48.8606, 2.3376),
        ]
    }

    fn requested(categories: &[PoiCategory]) -> HashSet<PoiCategory> {
        categories.iter().copied().collect()
    }

    #[test]
    fn test_classify_bakery_wins_over_other_tags() {
        let t = tags(&[("shop", "bakery"), ("amenity", "cafe"), ("name", "X")]);
        assert_eq!(PoiCategory::classify(&t), PoiCategory::Bakery);
    }

    #[test]
    fn test_classify_priority_order() {
        assert_eq!(
            PoiCategory::classify(&tags(&[("amenity", "bar")])),
            PoiCategory::Cafe
        );
        assert_eq!(
            PoiCategory::classify(&tags(&[("amenity", "pub")])),
            PoiCategory::Cafe
        );
        assert_eq!(
            PoiCategory::classify(&tags(&[("amenity", "drinking_water")])),
            PoiCategory::Water
        );
        assert_eq!(
            PoiCategory::classify(&tags(&[("amenity", "toilets")])),
            PoiCategory::Toilets
        );
        assert_eq!(
            PoiCategory::classify(&tags(&[("tourism", "guest_house")])),
            PoiCategory::Hotel
        );
    }

    #[test]
    fn test_classify_unmatched_tags_are_unknown() {
        assert_eq!(
            PoiCategory::classify(&tags(&[("amenity", "fountain")])),
            PoiCategory::Unknown
        );
        assert_eq!(PoiCategory::classify(&HashMap::new()), PoiCategory::Unknown);
    }

    #[test]
    fn test_filter_keeps_nearby_requested_poi() {
        let elements = vec![node(1, 48.8566, 2.3522, tags(&[("shop", "bakery")]))];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery]),
            None,
            Weekday::Mon,
            10 * 60,
        );

        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].category, PoiCategory::Bakery);
        assert_eq!(pois[0].distance_m, 0);
        assert_eq!(pois[0].name, "Boulangerie");
    }

    #[test]
    fn test_filter_drops_distant_poi() {
        // ~10 km south of the track
        let elements = vec![node(1, 48.76, 2.35, tags(&[("shop", "bakery")]))];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery]),
            None,
            Weekday::Mon,
            10 * 60,
        );

        assert!(pois.is_empty());
    }

    #[test]
    fn test_filter_drops_unknown_even_when_requested() {
        let elements = vec![node(1, 48.8566, 2.3522, tags(&[("amenity", "fountain")]))];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery, PoiCategory::Unknown]),
            None,
            Weekday::Mon,
            10 * 60,
        );

        assert!(pois.is_empty());
    }

    #[test]
    fn test_filter_drops_unrequested_category() {
        // Classifies as water, but only bakeries were requested.
        let elements = vec![node(1, 48.8566, 2.3522, tags(&[("amenity", "drinking_water")]))];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery]),
            None,
            Weekday::Mon,
            10 * 60,
        );

        assert!(pois.is_empty());
    }

    #[test]
    fn test_filter_drops_non_node_elements() {
        let mut way = node(1, 48.8566, 2.3522, tags(&[("shop", "bakery")]));
        way.element_type = "way".to_string();

        let pois = filter_and_classify(
            vec![way],
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery]),
            None,
            Weekday::Mon,
            10 * 60,
        );

        assert!(pois.is_empty());
    }

    #[test]
    fn test_filter_drops_candidates_in_exclusion_zone() {
        let zone = BoundingBox {
            south: 48.815,
            north: 48.902,
            west: 2.225,
            east: 2.470,
        };
        let elements = vec![node(1, 48.8566, 2.3522, tags(&[("shop", "bakery")]))];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery]),
            Some(&zone),
            Weekday::Mon,
            10 * 60,
        );

        assert!(pois.is_empty());
    }

    #[test]
    fn test_name_tag_wins_over_default() {
        let elements = vec![
            node(1, 48.8566, 2.3522, tags(&[("shop", "bakery"), ("name", "Au Levain")])),
            node(2, 48.8566, 2.3522, tags(&[("shop", "bakery"), ("name", "")])),
            node(3, 48.8566, 2.3522, tags(&[("amenity", "pub")])),
        ];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery, PoiCategory::Cafe]),
            None,
            Weekday::Mon,
            10 * 60,
        );

        assert_eq!(pois.len(), 3);
        assert_eq!(pois[0].name, "Au Levain");
        assert_eq!(pois[1].name, "Boulangerie");
        assert_eq!(pois[2].name, "Pub");
    }

    #[test]
    fn test_opening_hours_evaluated_per_poi() {
        let elements = vec![
            node(
                1,
                48.8566,
                2.3522,
                tags(&[("shop", "bakery"), ("opening_hours", "24/7")]),
            ),
            node(
                2,
                48.8566,
                2.3522,
                tags(&[("shop", "bakery"), ("opening_hours", "Tu-Su 07:00-13:00")]),
            ),
            node(3, 48.8566, 2.3522, tags(&[("shop", "bakery")])),
        ];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&[PoiCategory::Bakery]),
            None,
            Weekday::Mon,
            10 * 60,
        );

        assert_eq!(pois[0].open_now, OpenState::Open);
        assert_eq!(pois[1].open_now, OpenState::Closed);
        assert_eq!(pois[2].open_now, OpenState::Unknown);
    }

    #[test]
    fn test_stats_counts_by_category() {
        let elements = vec![
            node(1, 48.8566, 2.3522, tags(&[("shop", "bakery")])),
            node(2, 48.8566, 2.3522, tags(&[("amenity", "cafe")])),
            node(3, 48.8566, 2.3522, tags(&[("amenity", "cafe")])),
            node(4, 48.8566, 2.3522, tags(&[("tourism", "hotel")])),
        ];

        let pois = filter_and_classify(
            elements,
            &paris_track(),
            500.0,
            &requested(&PoiCategory::REQUESTABLE),
            None,
            Weekday::Mon,
            10 * 60,
        );
        let stats = PoiStats::from_pois(&pois);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.bakeries, 1);
        assert_eq!(stats.cafes, 2);
        assert_eq!(stats.hotels, 1);
        assert_eq!(stats.water_points, 0);
    }
}
