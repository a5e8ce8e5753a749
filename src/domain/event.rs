//! Planned road events and their enriched copies

use crate::domain::error::MalformedRecord;
use crate::domain::feed::{EventFeature, FeatureCollection, FeedHeader, Geometry};
use crate::domain::observation::SourceKind;
use crate::domain::types::{Direction, GeoPoint};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Horizon separating "pending" from "planned", and "completed recently"
/// from "completed"
const STATUS_HORIZON_DAYS: i64 = 7;

/// Lifecycle status of a planned event relative to a reference time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Starts more than a week from now
    Planned,
    /// Starts within the next week
    Pending,
    Active,
    /// Ended within the last week
    CompletedRecently,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Planned => "planned",
            EventStatus::Pending => "pending",
            EventStatus::Active => "active",
            EventStatus::CompletedRecently => "completed_recently",
            EventStatus::Completed => "completed",
        }
    }
}

/// A canonical planned road event, validated for matching.
///
/// Holds the feature itself plus a shared copy of its feed header so the
/// enriched result can be published as a feed of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEvent {
    id: String,
    direction: Direction,
    start_date: DateTime<Utc>,
    feature: EventFeature,
    feed: Arc<FeedHeader>,
}

impl PlannedEvent {
    pub fn from_feature(feature: EventFeature, feed: Arc<FeedHeader>) -> Result<Self, MalformedRecord> {
        let id = feature
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| MalformedRecord::missing("<unknown>", "id"))?;
        let has_coordinates =
            feature.geometry.as_ref().is_some_and(|g| !g.coordinates.is_empty());
        if !has_coordinates {
            return Err(MalformedRecord::missing(&id, "geometry"));
        }
        let direction = feature
            .properties
            .core_details
            .direction
            .ok_or_else(|| MalformedRecord::missing(&id, "core_details.direction"))?;
        let start_date = feature
            .properties
            .start_date
            .ok_or_else(|| MalformedRecord::missing(&id, "start_date"))?;
        if let Some(end_date) = feature.properties.end_date {
            if end_date < start_date {
                return Err(MalformedRecord::invalid(&id, "end_date", "before start_date"));
            }
        }

        Ok(Self { id, direction, start_date, feature, feed })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.feature.properties.end_date
    }

    pub fn description(&self) -> Option<&str> {
        self.feature.properties.core_details.description.as_deref()
    }

    pub fn update_date(&self) -> Option<DateTime<Utc>> {
        self.feature.properties.core_details.update_date
    }

    pub fn coordinates(&self) -> &[[f64; 2]] {
        self.feature.geometry.as_ref().map(|g| g.coordinates.as_slice()).unwrap_or(&[])
    }

    pub fn first_point(&self) -> Option<GeoPoint> {
        self.coordinates().first().copied().map(GeoPoint::from_lng_lat)
    }

    pub fn last_point(&self) -> Option<GeoPoint> {
        let coords = self.coordinates();
        (coords.len() > 1).then(|| GeoPoint::from_lng_lat(coords[coords.len() - 1]))
    }

    pub fn beginning_milepost(&self) -> Option<f64> {
        self.feature.properties.beginning_milepost
    }

    pub fn ending_milepost(&self) -> Option<f64> {
        self.feature.properties.ending_milepost
    }

    pub fn reduced_speed_limit_kph(&self) -> Option<f64> {
        self.feature.properties.reduced_speed_limit_kph
    }

    pub fn feature(&self) -> &EventFeature {
        &self.feature
    }

    pub fn feed_header(&self) -> &FeedHeader {
        &self.feed
    }

    /// Status relative to `now`
    pub fn status(&self, now: DateTime<Utc>) -> EventStatus {
        let horizon = Duration::days(STATUS_HORIZON_DAYS);
        if self.start_date > now + horizon {
            return EventStatus::Planned;
        }
        if self.start_date > now {
            return EventStatus::Pending;
        }
        match self.end_date() {
            Some(end) if end < now - horizon => EventStatus::Completed,
            Some(end) if end < now => EventStatus::CompletedRecently,
            _ => EventStatus::Active,
        }
    }

    pub fn set_start_date(&mut self, start_date: DateTime<Utc>) {
        self.start_date = start_date;
        self.feature.properties.start_date = Some(start_date);
    }

    pub fn set_end_date(&mut self, end_date: DateTime<Utc>) {
        self.feature.properties.end_date = Some(end_date);
    }

    pub fn set_update_date(&mut self, update_date: DateTime<Utc>) {
        self.feature.properties.core_details.update_date = Some(update_date);
    }

    /// Append free text to the description, once
    pub fn append_description(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let description = &mut self.feature.properties.core_details.description;
        match description {
            Some(existing) if existing.contains(text) => {}
            Some(existing) if !existing.trim().is_empty() => {
                existing.push(' ');
                existing.push_str(text);
            }
            _ => *description = Some(text.to_string()),
        }
    }

    /// Replace geometry and mileposts
    pub fn set_extent(&mut self, coordinates: Vec<[f64; 2]>, beginning: f64, ending: f64) {
        self.feature.geometry = Some(Geometry::line_string(coordinates));
        self.feature.properties.beginning_milepost = Some(beginning);
        self.feature.properties.ending_milepost = Some(ending);
    }

    pub fn set_reduced_speed_limit_kph(&mut self, limit: f64) {
        self.feature.properties.reduced_speed_limit_kph = Some(limit);
    }
}

/// Identifies the observation that produced an enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub payload: Option<Value>,
}

/// A planned event after a combiner merged an observation into it
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub event: PlannedEvent,
    pub provenance: Provenance,
}

impl EnrichedEvent {
    pub fn id(&self) -> &str {
        self.event.id()
    }

    pub fn source_kind(&self) -> SourceKind {
        self.provenance.source_kind
    }

    /// The feature with provenance injected into its properties
    pub fn to_feature(&self) -> EventFeature {
        let mut feature = self.event.feature().clone();
        let extra = &mut feature.properties.extra;
        extra.insert(
            "enrichment_source_type".to_string(),
            Value::String(self.provenance.source_kind.as_str().to_string()),
        );
        extra.insert(
            "enrichment_source_id".to_string(),
            Value::String(self.provenance.source_id.clone()),
        );
        if let Some(payload) = &self.provenance.payload {
            extra.insert("enrichment_source_payload".to_string(), payload.clone());
        }
        feature
    }

    /// A copy of the source feed holding only this feature
    pub fn to_feed(&self) -> FeatureCollection {
        let feature = serde_json::to_value(self.to_feature()).unwrap_or(Value::Null);
        FeatureCollection::new(self.event.feed_header().clone(), vec![feature])
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::json;

    /// Planned event with two coordinates, stated direction and dates
    pub fn planned_event(
        id: &str,
        direction: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> PlannedEvent {
        let mut properties = json!({
            "core_details": {
                "event_type": "work-zone",
                "direction": direction,
                "description": "Right lane closed"
            },
            "start_date": start,
        });
        if let Some(end) = end {
            properties["end_date"] = json!(end);
        }
        let feature: EventFeature = serde_json::from_value(json!({
            "id": id,
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": [[-104.90, 39.60], [-104.80, 39.70]] },
            "properties": properties
        }))
        .unwrap();
        let mut header = FeedHeader::new();
        header.insert("feed_info".to_string(), json!({ "publisher": "test" }));
        PlannedEvent::from_feature(feature, Arc::new(header)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::planned_event;
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_status_transitions() {
        let n = now();
        let cases = [
            (n + Duration::days(10), None, EventStatus::Planned),
            (n + Duration::hours(3), None, EventStatus::Pending),
            (n - Duration::days(1), None, EventStatus::Active),
            (n - Duration::days(1), Some(n + Duration::days(1)), EventStatus::Active),
            (n - Duration::days(3), Some(n - Duration::days(1)), EventStatus::CompletedRecently),
            (n - Duration::days(30), Some(n - Duration::days(8)), EventStatus::Completed),
        ];
        for (start, end, expected) in cases {
            let event = planned_event("e", "northbound", start, end);
            assert_eq!(event.status(n), expected, "start={start} end={end:?}");
        }
    }

    #[test]
    fn test_missing_direction_is_malformed() {
        let mut feature = planned_event("e1", "northbound", now(), None).feature().clone();
        feature.properties.core_details.direction = None;
        let err = PlannedEvent::from_feature(feature, Arc::new(FeedHeader::new())).unwrap_err();
        assert_eq!(err, MalformedRecord::missing("e1", "core_details.direction"));
    }

    #[test]
    fn test_end_before_start_is_malformed() {
        let mut feature = planned_event("e2", "northbound", now(), None).feature().clone();
        feature.properties.end_date = Some(now() - Duration::days(1));
        assert!(PlannedEvent::from_feature(feature, Arc::new(FeedHeader::new())).is_err());
    }

    #[test]
    fn test_append_description_once() {
        let mut event = planned_event("e3", "southbound", now(), None);
        event.append_description("Crash reported");
        event.append_description("Crash reported");
        assert_eq!(event.description(), Some("Right lane closed Crash reported"));
    }

    #[test]
    fn test_enriched_feed_has_one_feature_with_provenance() {
        let event = planned_event("e4", "eastbound", now(), None);
        let enriched = EnrichedEvent {
            event,
            provenance: Provenance {
                source_kind: SourceKind::FieldDevice,
                source_id: "dev-9".to_string(),
                payload: Some(serde_json::json!({ "status": "on" })),
            },
        };
        let feed = serde_json::to_value(enriched.to_feed()).unwrap();
        assert_eq!(feed["type"], "FeatureCollection");
        assert_eq!(feed["feed_info"]["publisher"], "test");
        assert_eq!(feed["features"].as_array().unwrap().len(), 1);
        let props = &feed["features"][0]["properties"];
        assert_eq!(props["enrichment_source_type"], "field_device_status");
        assert_eq!(props["enrichment_source_id"], "dev-9");
        assert_eq!(props["enrichment_source_payload"]["status"], "on");
        assert_eq!(props["core_details"]["event_type"], "work-zone");
    }
}
