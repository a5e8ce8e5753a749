//! Roadside-sensor narrative merge

use super::enriched;
use crate::domain::event::{EnrichedEvent, PlannedEvent};
use crate::domain::observation::{Observation, SensorIncident};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Append the incident narrative and move the start to the incident start
pub fn combine(
    event: &PlannedEvent,
    observation: &Observation,
    incident: &SensorIncident,
    now: DateTime<Utc>,
) -> Option<EnrichedEvent> {
    if let Some(end) = event.end_date() {
        if incident.start_time > end {
            debug!(
                event_id = %event.id(),
                station_id = %incident.station_id,
                "sensor_start_after_event_end"
            );
            return None;
        }
    }

    let mut updated = event.clone();
    updated.append_description(&incident.description);
    updated.set_start_date(incident.start_time);
    updated.set_update_date(now);
    Some(enriched(updated, observation, None))
}
