//! Speed-reduction attribute merge

use super::enriched;
use crate::domain::event::{EnrichedEvent, PlannedEvent};
use crate::domain::observation::{Observation, SpeedReduction};
use tracing::debug;

/// Set the reduced speed limit; nothing else changes
pub fn combine(
    event: &PlannedEvent,
    observation: &Observation,
    reduction: &SpeedReduction,
) -> Option<EnrichedEvent> {
    let limit = reduction.reduced_speed_limit_kph;
    if !limit.is_finite() || limit <= 0.0 {
        debug!(event_id = %event.id(), permit_id = %reduction.permit_id, limit_kph = %limit, "invalid_speed_limit");
        return None;
    }

    let mut updated = event.clone();
    updated.set_reduced_speed_limit_kph(limit);
    Some(enriched(updated, observation, None))
}
