//! Route projection: coordinates to linear-referenced locations
//!
//! The geospatial work happens in an external route service; this module
//! defines that seam (`RouteService`), the memoization seam
//! (`ProjectionCache`), and the `RouteProjector` that combines them and
//! applies the search radius. Projection failures are soft: callers get
//! `None` and drop the entity from matching.

use crate::domain::types::{GeoPoint, LinearLocation, RouteId, RouteResolution};
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Request for the stretch of route ahead of a moving vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryAheadRequest {
    pub route_id: RouteId,
    pub start_measure: f64,
    pub bearing: f64,
    /// Length of the slice in miles
    pub distance: f64,
    /// Measure bounds the slice must stay within, always `[low, high]`
    pub bounds: [f64; 2],
}

/// Route geometry between two measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSlice {
    pub coordinates: Vec<[f64; 2]>,
    pub start_measure: f64,
    pub end_measure: f64,
}

/// External geospatial service resolving points against the route network
#[async_trait]
pub trait RouteService: Send + Sync {
    /// Nearest route location for a point, or `None` if nothing is close
    async fn resolve(&self, point: GeoPoint) -> anyhow::Result<Option<RouteResolution>>;

    /// Like `resolve`, also reporting the travel direction implied by `bearing`
    async fn resolve_with_heading(
        &self,
        point: GeoPoint,
        bearing: f64,
    ) -> anyhow::Result<Option<RouteResolution>>;

    /// Route geometry ahead of a measure, clamped to the request bounds
    async fn geometry_ahead(
        &self,
        request: &GeometryAheadRequest,
    ) -> anyhow::Result<Option<RouteSlice>>;
}

/// Get/set cache for projections, keyed on the input coordinate.
///
/// No expiry is enforced here; a miss is a normal event.
pub trait ProjectionCache: Send + Sync {
    fn get(&self, key: &str) -> Option<RouteResolution>;
    fn set(&self, key: &str, value: RouteResolution);
}

/// In-process cache guarded by a mutex (a few hundred keys per cycle)
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<FxHashMap<String, RouteResolution>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ProjectionCache for MemoryCache {
    fn get(&self, key: &str) -> Option<RouteResolution> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: RouteResolution) {
        self.entries.lock().insert(key.to_string(), value);
    }
}

/// Cache that never stores anything
pub struct NoCache;

impl ProjectionCache for NoCache {
    fn get(&self, _key: &str) -> Option<RouteResolution> {
        None
    }

    fn set(&self, _key: &str, _value: RouteResolution) {}
}

/// Resolves coordinates to `LinearLocation`s through a cached route service
pub struct RouteProjector {
    service: Arc<dyn RouteService>,
    cache: Arc<dyn ProjectionCache>,
    /// Resolutions farther than this from the route are rejected (miles)
    search_radius_mi: f64,
    metrics: Arc<Metrics>,
}

impl RouteProjector {
    pub fn new(
        service: Arc<dyn RouteService>,
        cache: Arc<dyn ProjectionCache>,
        search_radius_mi: f64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { service, cache, search_radius_mi, metrics }
    }

    pub fn service(&self) -> &Arc<dyn RouteService> {
        &self.service
    }

    /// Project a point onto the nearest route
    pub async fn project(&self, point: GeoPoint) -> Option<LinearLocation> {
        self.lookup(point, None).await
    }

    /// Project a point using the observed bearing to pick the travel direction
    pub async fn project_with_heading(&self, point: GeoPoint, bearing: f64) -> Option<LinearLocation> {
        self.lookup(point, Some(bearing)).await
    }

    /// Dispatch on whether a bearing is available
    pub async fn project_point(&self, point: GeoPoint, bearing: Option<f64>) -> Option<LinearLocation> {
        self.lookup(point, bearing).await
    }

    async fn lookup(&self, point: GeoPoint, bearing: Option<f64>) -> Option<LinearLocation> {
        let key = match bearing {
            Some(b) => point.cache_key_with_heading(b),
            None => point.cache_key(),
        };

        let resolution = match self.cache.get(&key) {
            Some(hit) => {
                self.metrics.record_cache_hit();
                hit
            }
            None => {
                let start = Instant::now();
                let result = match bearing {
                    Some(b) => self.service.resolve_with_heading(point, b).await,
                    None => self.service.resolve(point).await,
                };
                self.metrics.record_projection_request(start.elapsed().as_micros() as u64);

                match result {
                    Ok(Some(resolution)) => {
                        self.cache.set(&key, resolution.clone());
                        resolution
                    }
                    Ok(None) => {
                        debug!(key = %key, "projection_no_route");
                        self.metrics.record_projection_failure();
                        return None;
                    }
                    Err(e) => {
                        info!(key = %key, error = %format!("{e:#}"), "projection_failed");
                        self.metrics.record_projection_failure();
                        return None;
                    }
                }
            }
        };

        if !(resolution.measure.is_finite()
            && resolution.route_min.is_finite()
            && resolution.route_max.is_finite())
        {
            info!(key = %key, route_id = %resolution.route_id, "projection_invalid_measure");
            self.metrics.record_projection_failure();
            return None;
        }

        if resolution.distance > self.search_radius_mi {
            debug!(
                key = %key,
                route_id = %resolution.route_id,
                distance_mi = %resolution.distance,
                radius_mi = %self.search_radius_mi,
                "projection_outside_radius"
            );
            self.metrics.record_projection_failure();
            return None;
        }

        Some(LinearLocation::from_resolution(resolution))
    }
}
