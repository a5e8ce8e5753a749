//! Field-device lifecycle merge

use super::{enriched, CombineContext};
use crate::domain::event::{EnrichedEvent, EventStatus, PlannedEvent};
use crate::domain::observation::{FieldDeviceStatus, Observation};
use tracing::debug;

/// A device on site confirms the event's lifecycle: a pending event has
/// started, a recently completed one is still running
pub fn combine(
    event: &PlannedEvent,
    observation: &Observation,
    device: &FieldDeviceStatus,
    ctx: &CombineContext<'_>,
) -> Option<EnrichedEvent> {
    let status = event.status(ctx.now);
    let mut updated = event.clone();

    match status {
        EventStatus::Pending => updated.set_start_date(ctx.now),
        EventStatus::CompletedRecently => {
            let end = event.end_date()?;
            updated.set_end_date(end + ctx.settings.field_device_grace);
            if let Some(description) = &device.description {
                updated.append_description(description);
            }
        }
        _ => {
            debug!(event_id = %event.id(), status = %status.as_str(), "device_status_ignored");
            return None;
        }
    }

    Some(enriched(updated, observation, Some(device.raw.clone())))
}
