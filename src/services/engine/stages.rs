//! Cycle stages for the FusionEngine
//!
//! Each stage consumes the previous stage's output and records what it
//! dropped in the cycle stats.

use super::{CycleStats, FusionEngine};
use crate::domain::event::{EnrichedEvent, PlannedEvent};
use crate::domain::observation::{Observation, SourceKind};
use crate::services::combiner::{self, CombineContext};
use crate::services::gate::MatchGate;
use crate::services::index::{IndexDrop, LinearIndex};
use crate::services::matcher::MatchedPair;
use crate::services::projection_pool::{project_batch, Projectable, Projected};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

impl FusionEngine {
    /// Drop observations that fail their profile's freshness check
    pub(crate) fn admit_fresh(
        &self,
        gate: &MatchGate,
        observations: Vec<Observation>,
        stats: &mut CycleStats,
    ) -> Vec<Observation> {
        observations
            .into_iter()
            .filter(|observation| {
                let fresh = gate.admits(observation);
                if !fresh {
                    debug!(
                        observation_id = %observation.id,
                        kind = %observation.kind(),
                        updated_at = %observation.updated_at,
                        "observation_stale"
                    );
                    self.metrics.record_stale();
                    stats.observations_stale += 1;
                }
                fresh
            })
            .collect()
    }

    /// Project both sides concurrently and index them by route.
    ///
    /// Both batches draw from one semaphore, so route service requests for
    /// the cycle never exceed `workers`.
    pub(crate) async fn locate(
        &self,
        observations: Vec<Observation>,
        events: Vec<PlannedEvent>,
        stats: &mut CycleStats,
    ) -> (LinearIndex<Observation>, LinearIndex<PlannedEvent>) {
        let limit = Arc::new(Semaphore::new(self.workers.max(1)));
        let (projected_observations, projected_events) = tokio::join!(
            project_batch(self.projector.clone(), observations, limit.clone()),
            project_batch(self.projector.clone(), events, limit),
        );

        let mut observation_index = LinearIndex::new();
        stats.observations_unlocated = self.index_all(&mut observation_index, projected_observations);
        let mut event_index = LinearIndex::new();
        stats.events_unlocated = self.index_all(&mut event_index, projected_events);

        (observation_index, event_index)
    }

    /// Insert into the index; returns how many entities were dropped
    fn index_all<T: Projectable>(&self, index: &mut LinearIndex<T>, projected: Vec<Projected<T>>) -> usize {
        let mut dropped = 0;
        for entity in projected {
            match index.insert(entity) {
                Ok(()) => {}
                Err(IndexDrop::Mismatched(_)) => {
                    self.metrics.record_route_mismatch();
                    dropped += 1;
                }
                Err(IndexDrop::Unlocated) => dropped += 1,
            }
        }
        dropped
    }

    /// Run each accepted pair through its combiner, sequentially and in order
    pub(crate) async fn combine_pairs(
        &self,
        pairs: Vec<MatchedPair<'_>>,
        now: DateTime<Utc>,
        stats: &mut CycleStats,
    ) -> FxHashMap<SourceKind, Vec<EnrichedEvent>> {
        let ctx = CombineContext {
            settings: &self.combiner_settings,
            service: self.projector.service().as_ref(),
            now,
        };

        let mut by_source: FxHashMap<SourceKind, Vec<EnrichedEvent>> = FxHashMap::default();
        for pair in pairs {
            let kind = pair.observation.entity.kind();
            match combiner::combine(pair, &ctx).await {
                Some(enriched) => {
                    self.metrics.record_enrichment(true);
                    *stats.enrichments.entry(kind).or_insert(0) += 1;
                    by_source.entry(kind).or_default().push(enriched);
                }
                None => {
                    debug!(
                        observation_id = %pair.observation.entity.id,
                        event_id = %pair.event.entity.id(),
                        kind = %kind,
                        "combiner_declined"
                    );
                    self.metrics.record_enrichment(false);
                    stats.combiner_declined += 1;
                }
            }
        }
        by_source
    }
}
