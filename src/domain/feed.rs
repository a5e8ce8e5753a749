//! Wire shapes for canonical road-event feeds (WZDx-style GeoJSON)
//!
//! Only the fields the fusion engine reads or writes are typed. Everything
//! else is carried through `extra` maps so an enriched feature round-trips
//! with all of its original properties.

use crate::domain::types::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Feed-level fields other than `type` and `features` (e.g. `feed_info`)
pub type FeedHeader = Map<String, Value>;

fn feature_collection_type() -> String {
    "FeatureCollection".to_string()
}

fn feature_type() -> String {
    "Feature".to_string()
}

/// A feed of road-event features.
///
/// Features stay untyped here so one bad feature does not reject the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "feature_collection_type")]
    pub kind: String,
    #[serde(flatten)]
    pub header: FeedHeader,
    #[serde(default)]
    pub features: Vec<Value>,
}

impl FeatureCollection {
    pub fn new(header: FeedHeader, features: Vec<Value>) -> Self {
        Self { kind: feature_collection_type(), header, features }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

impl Geometry {
    pub fn line_string(coordinates: Vec<[f64; 2]>) -> Self {
        Self { kind: "LineString".to_string(), coordinates }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventProperties {
    #[serde(default)]
    pub core_details: CoreDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beginning_milepost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_milepost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_speed_limit_kph: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One road-event feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: EventProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_feature() -> Value {
        json!({
            "id": "evt-1",
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": [[-105.1, 39.6], [-105.0, 39.7]] },
            "properties": {
                "core_details": {
                    "event_type": "work-zone",
                    "data_source_id": "planned-events",
                    "road_names": ["I-25"],
                    "direction": "northbound",
                    "description": "Lane closure"
                },
                "start_date": "2026-10-01T06:00:00Z",
                "end_date": "2026-10-30T18:00:00Z",
                "vehicle_impact": "some-lanes-closed"
            }
        })
    }

    #[test]
    fn test_feature_keeps_unknown_properties() {
        let feature: EventFeature = serde_json::from_value(sample_feature()).unwrap();
        assert_eq!(feature.id.as_deref(), Some("evt-1"));
        assert_eq!(feature.properties.core_details.direction, Some(Direction::Northbound));
        assert_eq!(feature.properties.extra["vehicle_impact"], "some-lanes-closed");

        let back = serde_json::to_value(&feature).unwrap();
        assert_eq!(back["properties"]["core_details"]["road_names"][0], "I-25");
        assert_eq!(back["properties"]["core_details"]["event_type"], "work-zone");
        assert!(back["properties"].get("beginning_milepost").is_none());
    }

    #[test]
    fn test_collection_header_round_trip() {
        let feed: FeatureCollection = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "feed_info": { "publisher": "DOT", "version": "4.2" },
            "features": [sample_feature()]
        }))
        .unwrap();
        assert_eq!(feed.features.len(), 1);
        assert_eq!(feed.header["feed_info"]["publisher"], "DOT");
        assert!(!feed.header.contains_key("features"));
    }

    #[test]
    fn test_bad_date_fails_feature_only() {
        let mut raw = sample_feature();
        raw["properties"]["start_date"] = json!("not a date");
        assert!(serde_json::from_value::<EventFeature>(raw.clone()).is_err());

        let feed: FeatureCollection =
            serde_json::from_value(json!({ "type": "FeatureCollection", "features": [raw] }))
                .unwrap();
        assert_eq!(feed.features.len(), 1);
    }
}
