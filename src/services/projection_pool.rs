//! Bounded worker pool for route projection
//!
//! Route projection is the only stage that leaves the process, so it is the
//! only stage run concurrently. Each entity's endpoints are projected in its
//! own task. Every route lookup holds a permit from a semaphore shared by the
//! whole cycle, so at most that many requests reach the route service at
//! once. Results come back in input order because matching scans in input
//! order.

use crate::domain::event::PlannedEvent;
use crate::domain::observation::{Observation, SourceKind};
use crate::domain::types::{GeoPoint, LinearLocation};
use crate::services::projector::RouteProjector;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Something with a geometry whose endpoints can be projected
pub trait Projectable {
    /// Identifier used in logs
    fn record_id(&self) -> &str;

    /// First coordinate, and the last one when it differs from the first.
    /// `None` when there is no geometry at all.
    fn endpoints(&self) -> Option<(GeoPoint, Option<GeoPoint>)>;

    /// Bearing to use for heading-aware projection
    fn heading(&self) -> Option<f64> {
        None
    }
}

impl Projectable for PlannedEvent {
    fn record_id(&self) -> &str {
        self.id()
    }

    fn endpoints(&self) -> Option<(GeoPoint, Option<GeoPoint>)> {
        Some((self.first_point()?, self.last_point()))
    }
}

impl Projectable for Observation {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn endpoints(&self) -> Option<(GeoPoint, Option<GeoPoint>)> {
        Some((self.first_point()?, self.last_point()))
    }

    fn heading(&self) -> Option<f64> {
        match self.kind() {
            SourceKind::Attenuator => self.bearing,
            _ => None,
        }
    }
}

/// Projection outcome for one entity's endpoints
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoints {
    Single(Option<LinearLocation>),
    Pair(Option<LinearLocation>, Option<LinearLocation>),
}

/// An entity with its (possibly failed) endpoint projections
#[derive(Debug)]
pub struct Projected<T> {
    pub entity: T,
    pub endpoints: Endpoints,
}

/// One route lookup under a permit from `limit`
async fn project_bounded(
    projector: &RouteProjector,
    limit: &Semaphore,
    point: GeoPoint,
    heading: Option<f64>,
) -> Option<LinearLocation> {
    // The semaphore is never closed, so acquire only fails if it were
    let _permit = limit.acquire().await.ok();
    projector.project_point(point, heading).await
}

/// Project every entity's endpoints, holding one permit of `limit` per lookup.
///
/// Batches that share `limit` share its bound. Output order matches input
/// order. A task that panics loses its entity, which is logged and treated
/// like a projection failure.
pub async fn project_batch<T>(
    projector: Arc<RouteProjector>,
    entities: Vec<T>,
    limit: Arc<Semaphore>,
) -> Vec<Projected<T>>
where
    T: Projectable + Send + 'static,
{
    let total = entities.len();
    let started = Instant::now();
    let mut tasks = JoinSet::new();

    for (idx, entity) in entities.into_iter().enumerate() {
        let projector = projector.clone();
        let limit = limit.clone();
        tasks.spawn(async move {
            let heading = entity.heading();
            let endpoints = match entity.endpoints() {
                None => {
                    warn!(record_id = %entity.record_id(), "entity_without_geometry");
                    Endpoints::Single(None)
                }
                Some((first, None)) => {
                    Endpoints::Single(project_bounded(&projector, &limit, first, heading).await)
                }
                Some((first, Some(last))) => {
                    let (start, end) = tokio::join!(
                        project_bounded(&projector, &limit, first, heading),
                        project_bounded(&projector, &limit, last, heading)
                    );
                    Endpoints::Pair(start, end)
                }
            };
            (idx, Projected { entity, endpoints })
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "projection_task_failed"),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);

    debug!(
        entities = %total,
        projected = %results.len(),
        elapsed_ms = %started.elapsed().as_millis(),
        "projection_batch_complete"
    );

    results.into_iter().map(|(_, projected)| projected).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::test_support::planned_event;
    use crate::infra::metrics::Metrics;
    use crate::services::projector::test_support::TableRouteService;
    use crate::domain::observation::{FieldDeviceStatus, ObservationPayload};
    use crate::domain::types::Direction;
    use crate::services::projector::{MemoryCache, NoCache};
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_project_batch_keeps_input_order() {
        // planned_event geometry runs from lng -104.90 to -104.80
        let service = TableRouteService::default()
            .with(-104.90, "070A", 10.0)
            .with(-104.80, "070A", 12.0);
        let projector = Arc::new(RouteProjector::new(
            Arc::new(service),
            Arc::new(MemoryCache::new()),
            0.1,
            Arc::new(Metrics::new()),
        ));

        let events: Vec<PlannedEvent> = (0..20)
            .map(|i| planned_event(&format!("evt-{i}"), "eastbound", Utc::now(), None))
            .collect();

        let projected = project_batch(projector, events, Arc::new(Semaphore::new(3))).await;

        assert_eq!(projected.len(), 20);
        for (i, p) in projected.iter().enumerate() {
            assert_eq!(p.entity.id(), format!("evt-{i}"));
            match &p.endpoints {
                Endpoints::Pair(Some(start), Some(end)) => {
                    assert_eq!(start.measure(), 10.0);
                    assert_eq!(end.measure(), 12.0);
                }
                other => panic!("unexpected endpoints {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_unresolved_endpoint_is_reported() {
        let service = TableRouteService::default().with(-104.90, "070A", 10.0);
        let projector = Arc::new(RouteProjector::new(
            Arc::new(service),
            Arc::new(MemoryCache::new()),
            0.1,
            Arc::new(Metrics::new()),
        ));
        let events = vec![planned_event("evt-1", "eastbound", Utc::now(), None)];

        let projected = project_batch(projector, events, Arc::new(Semaphore::new(1))).await;

        assert!(matches!(projected[0].endpoints, Endpoints::Pair(Some(_), None)));
    }

    fn slow_projector(service: Arc<TableRouteService>) -> Arc<RouteProjector> {
        Arc::new(RouteProjector::new(service, Arc::new(NoCache), 0.1, Arc::new(Metrics::new())))
    }

    fn slow_service() -> Arc<TableRouteService> {
        Arc::new(
            TableRouteService::default()
                .with(-104.90, "070A", 10.0)
                .with(-104.80, "070A", 12.0)
                .with_delay(Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn test_both_endpoints_share_the_limit() {
        let service = slow_service();
        let events: Vec<PlannedEvent> = (0..4)
            .map(|i| planned_event(&format!("evt-{i}"), "eastbound", Utc::now(), None))
            .collect();

        let projected =
            project_batch(slow_projector(service.clone()), events, Arc::new(Semaphore::new(1))).await;

        assert_eq!(projected.len(), 4);
        assert_eq!(service.calls(), 8);
        assert_eq!(service.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_batches_share_the_limit() {
        let service = slow_service();
        let projector = slow_projector(service.clone());
        let limit = Arc::new(Semaphore::new(2));
        let batch = |prefix: &str| -> Vec<PlannedEvent> {
            (0..5)
                .map(|i| planned_event(&format!("{prefix}-{i}"), "eastbound", Utc::now(), None))
                .collect()
        };

        let (left, right) = tokio::join!(
            project_batch(projector.clone(), batch("a"), limit.clone()),
            project_batch(projector.clone(), batch("b"), limit.clone()),
        );

        assert_eq!(left.len() + right.len(), 10);
        assert_eq!(service.calls(), 20);
        assert!(service.peak_in_flight() <= 2, "peak {}", service.peak_in_flight());
        assert_eq!(limit.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_observation_without_geometry_is_unlocated() {
        let service = slow_service();
        let observation = Observation {
            id: "dev-empty".to_string(),
            updated_at: Utc::now(),
            bearing: None,
            direction: Direction::Unknown,
            geometry: Vec::new(),
            payload: ObservationPayload::FieldDeviceStatus(FieldDeviceStatus {
                device_id: "AB-1".to_string(),
                device_type: "arrow-board".to_string(),
                description: None,
                raw: serde_json::json!({}),
            }),
        };

        let projected =
            project_batch(slow_projector(service.clone()), vec![observation], Arc::new(Semaphore::new(1))).await;

        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].endpoints, Endpoints::Single(None));
        assert_eq!(service.calls(), 0);
    }
}
