//! Attenuator lookahead: reshape the event to the road ahead of the vehicle
//!
//! A truck-mounted attenuator trails the active work. The stretch it will
//! cover in the lookahead interval replaces the event's geometry and
//! mileposts, bounded by the event's own projected range.

use super::{enriched, CombineContext, CombinerSettings};
use crate::domain::event::{EnrichedEvent, PlannedEvent};
use crate::domain::observation::AttenuatorTelemetry;
use crate::domain::types::{Direction, LocationRange};
use crate::services::matcher::MatchedPair;
use crate::services::projector::{GeometryAheadRequest, RouteSlice};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Miles covered at `speed_mph` (never below the floor) during the lookahead
pub fn lookahead_distance_mi(speed_mph: f64, settings: &CombinerSettings) -> f64 {
    speed_mph.max(settings.floor_speed_mph) * settings.lookahead_secs as f64 / 3600.0
}

/// Compass bearing for a stated direction, when no bearing was reported
fn nominal_bearing(direction: Direction) -> Option<f64> {
    match direction {
        Direction::Northbound => Some(0.0),
        Direction::Eastbound => Some(90.0),
        Direction::Southbound => Some(180.0),
        Direction::Westbound => Some(270.0),
        Direction::Unknown => None,
    }
}

/// Slice request starting at the vehicle, bounded low-to-high by the event range
pub fn lookahead_request(
    vehicle: &LocationRange,
    event: &LocationRange,
    bearing: f64,
    distance_mi: f64,
) -> GeometryAheadRequest {
    GeometryAheadRequest {
        route_id: event.route_id().clone(),
        start_measure: vehicle.start().measure(),
        bearing,
        distance: distance_mi,
        bounds: [event.low(), event.high()],
    }
}

/// Replace the event's extent with `slice`, measures clamped into `bounds`.
///
/// Returns false (and leaves the event alone) for an empty slice.
pub fn apply_slice(
    event: &mut PlannedEvent,
    slice: RouteSlice,
    bounds: [f64; 2],
    now: DateTime<Utc>,
) -> bool {
    if slice.coordinates.is_empty() {
        return false;
    }
    let [low, high] = bounds;
    let beginning = slice.start_measure.clamp(low, high);
    let ending = slice.end_measure.clamp(low, high);
    event.set_extent(slice.coordinates, beginning, ending);
    event.set_update_date(now);
    true
}

pub async fn combine(
    pair: MatchedPair<'_>,
    telemetry: &AttenuatorTelemetry,
    ctx: &CombineContext<'_>,
) -> Option<EnrichedEvent> {
    let observation = &pair.observation.entity;
    let event = &pair.event.entity;

    let bearing = observation
        .bearing
        .or_else(|| nominal_bearing(observation.direction))
        .or_else(|| nominal_bearing(event.direction()))?;
    let distance = lookahead_distance_mi(telemetry.speed_mph, ctx.settings);
    let request = lookahead_request(&pair.observation.range, &pair.event.range, bearing, distance);

    let slice = match ctx.service.geometry_ahead(&request).await {
        Ok(Some(slice)) => slice,
        Ok(None) => {
            debug!(event_id = %event.id(), route_id = %request.route_id, "lookahead_no_geometry");
            return None;
        }
        Err(e) => {
            info!(
                event_id = %event.id(),
                vehicle_id = %telemetry.vehicle_id,
                error = %format!("{e:#}"),
                "lookahead_failed"
            );
            return None;
        }
    };

    let mut updated = event.clone();
    if !apply_slice(&mut updated, slice, request.bounds, ctx.now) {
        debug!(event_id = %event.id(), "lookahead_empty_slice");
        return None;
    }

    debug!(
        event_id = %event.id(),
        vehicle_id = %telemetry.vehicle_id,
        distance_mi = %distance,
        beginning_milepost = ?updated.beginning_milepost(),
        ending_milepost = ?updated.ending_milepost(),
        "attenuator_merged"
    );
    Some(enriched(updated, observation, None))
}
