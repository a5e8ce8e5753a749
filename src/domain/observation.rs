//! Field observations: the corroborating data fused onto planned events
//!
//! Every observation shares a common envelope (id, last update, bearing or
//! stated direction, geometry) and carries one kind-specific payload. The
//! payload kind selects the source profile used by the gate and the
//! combiner that merges it.

use crate::domain::error::MalformedRecord;
use crate::domain::types::{Direction, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Vehicle telemetry from a truck-mounted attenuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttenuatorTelemetry {
    pub vehicle_id: String,
    pub speed_mph: f64,
}

/// Incident reported by a roadside sensor station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorIncident {
    pub station_id: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Permitted speed reduction submitted for a work zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedReduction {
    pub permit_id: String,
    pub reduced_speed_limit_kph: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Status report from a generic field device (arrow board, sign, camera, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDeviceStatus {
    pub device_id: String,
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationPayload {
    AttenuatorTelemetry(AttenuatorTelemetry),
    RoadsideSensorIncident(SensorIncident),
    SpeedReductionSubmission(SpeedReduction),
    FieldDeviceStatus(FieldDeviceStatus),
}

impl ObservationPayload {
    pub fn kind(&self) -> SourceKind {
        match self {
            ObservationPayload::AttenuatorTelemetry(_) => SourceKind::Attenuator,
            ObservationPayload::RoadsideSensorIncident(_) => SourceKind::RoadsideSensor,
            ObservationPayload::SpeedReductionSubmission(_) => SourceKind::SpeedReduction,
            ObservationPayload::FieldDeviceStatus(_) => SourceKind::FieldDevice,
        }
    }
}

/// How an observation's direction must agree with the planned event's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionPolicy {
    /// Direction must be known and equal
    Strict,
    /// Unknown direction passes; known direction must be equal
    Lenient,
}

/// Observation source, in ascending assembly priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    FieldDevice,
    RoadsideSensor,
    SpeedReduction,
    Attenuator,
}

impl SourceKind {
    /// Lowest confidence first, highest last
    pub const PRIORITY: [SourceKind; 4] = [
        SourceKind::FieldDevice,
        SourceKind::RoadsideSensor,
        SourceKind::SpeedReduction,
        SourceKind::Attenuator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::FieldDevice => "field_device_status",
            SourceKind::RoadsideSensor => "roadside_sensor_incident",
            SourceKind::SpeedReduction => "speed_reduction_submission",
            SourceKind::Attenuator => "attenuator_telemetry",
        }
    }

    pub fn direction_policy(&self) -> DirectionPolicy {
        match self {
            SourceKind::FieldDevice => DirectionPolicy::Lenient,
            _ => DirectionPolicy::Strict,
        }
    }

    /// Whether stale observations of this kind are excluded before matching
    pub fn checks_freshness(&self) -> bool {
        matches!(self, SourceKind::Attenuator | SourceKind::FieldDevice)
    }

    /// Whether accepted pairs must also agree on their validity intervals
    pub fn checks_window(&self) -> bool {
        matches!(self, SourceKind::RoadsideSensor | SourceKind::SpeedReduction)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observation as it arrives, before required fields are checked
#[derive(Debug, Clone, Deserialize)]
pub struct RawObservation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub geometry: Vec<[f64; 2]>,
    #[serde(flatten)]
    pub payload: ObservationPayload,
}

/// A validated observation
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    /// Instantaneous compass bearing in degrees, if reported
    pub bearing: Option<f64>,
    /// Stated direction; `Unknown` when not given
    pub direction: Direction,
    pub geometry: Vec<GeoPoint>,
    pub payload: ObservationPayload,
}

impl TryFrom<RawObservation> for Observation {
    type Error = MalformedRecord;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| MalformedRecord::missing("<unknown>", "id"))?;
        let updated_at = raw.updated_at.ok_or_else(|| MalformedRecord::missing(&id, "updated_at"))?;
        if raw.geometry.is_empty() {
            return Err(MalformedRecord::missing(&id, "geometry"));
        }
        if let Some(bearing) = raw.bearing {
            if !bearing.is_finite() {
                return Err(MalformedRecord::invalid(&id, "bearing", "not a finite number"));
            }
        }
        let direction = raw.direction.unwrap_or_default();
        let kind = raw.payload.kind();
        if kind.direction_policy() == DirectionPolicy::Strict
            && raw.bearing.is_none()
            && !direction.is_known()
        {
            return Err(MalformedRecord::missing(&id, "direction"));
        }

        Ok(Self {
            id,
            updated_at,
            bearing: raw.bearing,
            direction,
            geometry: raw.geometry.into_iter().map(GeoPoint::from_lng_lat).collect(),
            payload: raw.payload,
        })
    }
}

impl Observation {
    pub fn kind(&self) -> SourceKind {
        self.payload.kind()
    }

    /// First coordinate of the observation geometry
    pub fn first_point(&self) -> Option<GeoPoint> {
        self.geometry.first().copied()
    }

    /// Last coordinate, when the geometry has more than one
    pub fn last_point(&self) -> Option<GeoPoint> {
        if self.geometry.len() > 1 {
            self.geometry.last().copied()
        } else {
            None
        }
    }

    /// Interval during which the observation claims to be valid.
    /// An open end is treated as a point in time at the start.
    pub fn validity(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match &self.payload {
            ObservationPayload::RoadsideSensorIncident(incident) => {
                Some((incident.start_time, incident.end_time.unwrap_or(incident.start_time)))
            }
            ObservationPayload::SpeedReductionSubmission(reduction) => {
                Some((reduction.start_date, reduction.end_date))
            }
            _ => None,
        }
    }
}
