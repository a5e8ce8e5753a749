//! Linear location index: entities bucketed by resolved route

use crate::domain::error::MismatchedRoute;
use crate::domain::types::{Located, LocationRange, RouteId};
use crate::services::projection_pool::{Endpoints, Projectable, Projected};
use rustc_hash::FxHashMap;
use tracing::info;

/// Why an entity did not make it into the index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexDrop {
    /// At least one endpoint could not be projected
    Unlocated,
    /// Endpoints resolved to different routes
    Mismatched(MismatchedRoute),
}

/// `route_id -> [entities]`, preserving input order within each bucket
#[derive(Debug)]
pub struct LinearIndex<T> {
    buckets: FxHashMap<RouteId, Vec<Located<T>>>,
    /// Routes in first-seen order, for deterministic iteration
    routes: Vec<RouteId>,
}

impl<T> Default for LinearIndex<T> {
    fn default() -> Self {
        Self { buckets: FxHashMap::default(), routes: Vec::new() }
    }
}

impl<T: Projectable> LinearIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a projected entity; returns why it was left out, if it was
    pub fn insert(&mut self, projected: Projected<T>) -> Result<(), IndexDrop> {
        let Projected { entity, endpoints } = projected;

        let range = match endpoints {
            Endpoints::Single(Some(location)) => LocationRange::point(location),
            Endpoints::Pair(Some(start), Some(end)) => match LocationRange::bounded(start, end) {
                Ok(range) => range,
                Err(mismatch) => {
                    info!(
                        record_id = %entity.record_id(),
                        start_route = %mismatch.start,
                        end_route = %mismatch.end,
                        "route_mismatch"
                    );
                    return Err(IndexDrop::Mismatched(mismatch));
                }
            },
            _ => {
                info!(record_id = %entity.record_id(), "entity_unlocated");
                return Err(IndexDrop::Unlocated);
            }
        };

        let route_id = range.route_id().clone();
        let bucket = self.buckets.entry(route_id.clone()).or_insert_with(|| {
            self.routes.push(route_id);
            Vec::new()
        });
        bucket.push(Located::new(entity, range));
        Ok(())
    }
}

impl<T> LinearIndex<T> {
    /// Entities on a route, in input order
    pub fn bucket(&self, route_id: &RouteId) -> &[Located<T>] {
        self.buckets.get(route_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Routes in first-seen order
    pub fn routes(&self) -> impl Iterator<Item = &RouteId> {
        self.routes.iter()
    }

    /// Total indexed entities
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
