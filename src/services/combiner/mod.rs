//! Per-source combiners: merge a matched observation into its planned event
//!
//! Each combiner works on a copy of the event and either returns the whole
//! enriched copy or nothing. The input event is never modified.

pub mod attenuator;
pub mod field_device;
pub mod roadside_sensor;
pub mod speed_reduction;

use crate::domain::event::{EnrichedEvent, PlannedEvent, Provenance};
use crate::domain::observation::{Observation, ObservationPayload};
use crate::infra::config::Config;
use crate::services::matcher::MatchedPair;
use crate::services::projector::RouteService;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct CombinerSettings {
    pub lookahead_secs: u64,
    pub floor_speed_mph: f64,
    pub field_device_grace: Duration,
}

impl Default for CombinerSettings {
    fn default() -> Self {
        Self { lookahead_secs: 1800, floor_speed_mph: 5.0, field_device_grace: Duration::hours(2) }
    }
}

impl CombinerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lookahead_secs: config.lookahead_secs(),
            floor_speed_mph: config.floor_speed_mph(),
            field_device_grace: config.field_device_grace(),
        }
    }
}

/// What a combiner may consult besides the pair itself
pub struct CombineContext<'a> {
    pub settings: &'a CombinerSettings,
    pub service: &'a dyn RouteService,
    pub now: DateTime<Utc>,
}

/// Dispatch a matched pair to the combiner for its observation kind
pub async fn combine(pair: MatchedPair<'_>, ctx: &CombineContext<'_>) -> Option<EnrichedEvent> {
    let observation = &pair.observation.entity;
    match &observation.payload {
        ObservationPayload::AttenuatorTelemetry(telemetry) => {
            attenuator::combine(pair, telemetry, ctx).await
        }
        ObservationPayload::RoadsideSensorIncident(incident) => {
            roadside_sensor::combine(&pair.event.entity, observation, incident, ctx.now)
        }
        ObservationPayload::SpeedReductionSubmission(reduction) => {
            speed_reduction::combine(&pair.event.entity, observation, reduction)
        }
        ObservationPayload::FieldDeviceStatus(device) => {
            field_device::combine(&pair.event.entity, observation, device, ctx)
        }
    }
}

/// Wrap an enriched copy with provenance for `observation`
fn enriched(event: PlannedEvent, observation: &Observation, payload: Option<Value>) -> EnrichedEvent {
    EnrichedEvent {
        event,
        provenance: Provenance {
            source_kind: observation.kind(),
            source_id: observation.id.clone(),
            payload,
        },
    }
}
