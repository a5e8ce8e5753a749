//! Fusion cycle orchestration
//!
//! One cycle takes a snapshot of planned events and observations and
//! produces the enriched feed:
//! - freshness gate on observations
//! - route projection of both sides (the only concurrent stage)
//! - linear indexing by route
//! - matching under the configured strategy
//! - per-source combination
//! - priority-ordered assembly

mod stages;

use crate::domain::event::{EnrichedEvent, PlannedEvent};
use crate::domain::observation::{Observation, SourceKind};
use crate::infra::config::{Config, MatchStrategy};
use crate::infra::metrics::Metrics;
use crate::services::combiner::CombinerSettings;
use crate::services::gate::{GateSettings, MatchGate};
use crate::services::matcher::Matcher;
use crate::services::projector::{ProjectionCache, RouteProjector, RouteService};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Counters for one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    /// Time-sortable id correlating this cycle's log lines
    pub cycle_id: String,
    pub observations_in: usize,
    pub observations_stale: usize,
    pub observations_unlocated: usize,
    pub events_in: usize,
    pub events_unlocated: usize,
    pub pairs_tested: usize,
    pub pairs_matched: usize,
    pub enrichments: BTreeMap<SourceKind, usize>,
    pub combiner_declined: usize,
    pub emitted: usize,
    pub elapsed_ms: u64,
}

impl CycleStats {
    pub fn enrichments_for(&self, kind: SourceKind) -> usize {
        self.enrichments.get(&kind).copied().unwrap_or(0)
    }

    pub fn log(&self) {
        info!(
            cycle_id = %self.cycle_id,
            observations_in = %self.observations_in,
            observations_stale = %self.observations_stale,
            observations_unlocated = %self.observations_unlocated,
            events_in = %self.events_in,
            events_unlocated = %self.events_unlocated,
            pairs_tested = %self.pairs_tested,
            pairs_matched = %self.pairs_matched,
            attenuator = %self.enrichments_for(SourceKind::Attenuator),
            speed_reduction = %self.enrichments_for(SourceKind::SpeedReduction),
            roadside_sensor = %self.enrichments_for(SourceKind::RoadsideSensor),
            field_device = %self.enrichments_for(SourceKind::FieldDevice),
            combiner_declined = %self.combiner_declined,
            emitted = %self.emitted,
            elapsed_ms = %self.elapsed_ms,
            "cycle_complete"
        );
    }
}

#[derive(Debug)]
pub struct CycleOutput {
    pub enriched: Vec<EnrichedEvent>,
    pub stats: CycleStats,
}

/// Runs fusion cycles against an injected route service and cache
pub struct FusionEngine {
    pub(crate) projector: Arc<RouteProjector>,
    pub(crate) workers: usize,
    pub(crate) strategy: MatchStrategy,
    pub(crate) gate_settings: GateSettings,
    pub(crate) combiner_settings: CombinerSettings,
    pub(crate) metrics: Arc<Metrics>,
}

impl FusionEngine {
    pub fn new(
        config: &Config,
        service: Arc<dyn RouteService>,
        cache: Arc<dyn ProjectionCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let projector = RouteProjector::new(service, cache, config.search_radius_mi(), metrics.clone());
        Self {
            projector: Arc::new(projector),
            workers: config.projection_workers(),
            strategy: config.match_strategy(),
            gate_settings: GateSettings::from_config(config),
            combiner_settings: CombinerSettings::from_config(config),
            metrics,
        }
    }

    /// Run one fusion cycle as of `now`
    pub async fn run_cycle(
        &self,
        observations: Vec<Observation>,
        events: Vec<PlannedEvent>,
        now: DateTime<Utc>,
    ) -> CycleOutput {
        let started = Instant::now();
        let mut stats = CycleStats {
            cycle_id: Uuid::now_v7().to_string(),
            observations_in: observations.len(),
            events_in: events.len(),
            ..Default::default()
        };
        let gate = MatchGate::new(self.gate_settings, now);

        let observations = self.admit_fresh(&gate, observations, &mut stats);

        let (observation_index, event_index) = self.locate(observations, events, &mut stats).await;

        let mut matcher = Matcher::new(gate, self.strategy, self.metrics.clone());
        let pairs = matcher.match_index(&observation_index, &event_index);
        let tally = matcher.tally();
        stats.pairs_tested = tally.tested;
        stats.pairs_matched = tally.matched;

        let by_source = self.combine_pairs(pairs, now, &mut stats).await;
        let enriched = crate::services::assembler::assemble(by_source);

        stats.emitted = enriched.len();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_cycle();
        self.metrics.record_emitted(enriched.len());
        stats.log();

        CycleOutput { enriched, stats }
    }
}
