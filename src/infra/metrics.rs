//! Lock-free metrics collection and cycle reporting
//!
//! Uses atomics so projection workers can record without contention.
//! `report()` swaps the per-cycle counters to get a consistent snapshot.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use crate::services::gate::Rejection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for route service latency (microseconds)
/// Buckets: ≤1ms, ≤2ms, ≤4ms, ... ≤512ms, >512ms
const BUCKET_BOUNDS: [u64; 10] =
    [1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000, 128_000, 256_000, 512_000];
const NUM_BUCKETS: usize = 11;

/// Upper bounds for percentile estimates (last bucket uses 2x the previous bound)
const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [
    1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000, 128_000, 256_000, 512_000, 1_024_000,
];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// Counters are monotonic over the process lifetime except where noted.
pub struct Metrics {
    /// Cycles completed
    cycles_total: AtomicU64,
    /// Route service requests issued (cache misses)
    projections_requested: AtomicU64,
    /// Projections answered from the cache
    projection_cache_hits: AtomicU64,
    /// Points that could not be resolved to a route
    projection_failures: AtomicU64,
    /// Route service latency histogram (reset on report)
    projection_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of route service latencies (reset on report)
    projection_latency_sum_us: AtomicU64,
    /// Max route service latency (reset on report)
    projection_latency_max_us: AtomicU64,
    /// Entities whose endpoints resolved to different routes
    route_mismatches: AtomicU64,
    /// Records skipped for missing or invalid fields
    malformed_records: AtomicU64,
    /// Observations excluded by the freshness gate
    stale_observations: AtomicU64,
    /// Candidate pairs tested by the gate
    pairs_tested: AtomicU64,
    /// Candidate pairs accepted by the gate
    pairs_matched: AtomicU64,
    rejected_no_overlap: AtomicU64,
    rejected_direction: AtomicU64,
    rejected_window: AtomicU64,
    rejected_route: AtomicU64,
    /// Enrichments produced by combiners
    enrichments_total: AtomicU64,
    /// Accepted pairs a combiner declined
    combiner_declined: AtomicU64,
    /// Enriched events emitted after assembly
    emitted_total: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            projections_requested: AtomicU64::new(0),
            projection_cache_hits: AtomicU64::new(0),
            projection_failures: AtomicU64::new(0),
            projection_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            projection_latency_sum_us: AtomicU64::new(0),
            projection_latency_max_us: AtomicU64::new(0),
            route_mismatches: AtomicU64::new(0),
            malformed_records: AtomicU64::new(0),
            stale_observations: AtomicU64::new(0),
            pairs_tested: AtomicU64::new(0),
            pairs_matched: AtomicU64::new(0),
            rejected_no_overlap: AtomicU64::new(0),
            rejected_direction: AtomicU64::new(0),
            rejected_window: AtomicU64::new(0),
            rejected_route: AtomicU64::new(0),
            enrichments_total: AtomicU64::new(0),
            combiner_declined: AtomicU64::new(0),
            emitted_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_cycle(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a route service round trip (lock-free)
    #[inline]
    pub fn record_projection_request(&self, latency_us: u64) {
        self.projections_requested.fetch_add(1, Ordering::Relaxed);
        self.projection_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        let bucket = bucket_index(latency_us);
        self.projection_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.projection_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_cache_hit(&self) {
        self.projection_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_projection_failure(&self) {
        self.projection_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_mismatch(&self) {
        self.route_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.malformed_records.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale(&self) {
        self.stale_observations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the gate's verdict on one candidate pair
    #[inline]
    pub fn record_pair(&self, verdict: Result<(), Rejection>) {
        self.pairs_tested.fetch_add(1, Ordering::Relaxed);
        let counter = match verdict {
            Ok(()) => &self.pairs_matched,
            Err(Rejection::RouteMismatch) => &self.rejected_route,
            Err(Rejection::NoOverlap) => &self.rejected_no_overlap,
            Err(Rejection::Direction) => &self.rejected_direction,
            Err(Rejection::OutsideWindow) => &self.rejected_window,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enrichment(&self, produced: bool) {
        if produced {
            self.enrichments_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.combiner_declined.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_emitted(&self, count: usize) {
        self.emitted_total.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn pairs_matched(&self) -> u64 {
        self.pairs_matched.load(Ordering::Relaxed)
    }

    pub fn projection_cache_hits(&self) -> u64 {
        self.projection_cache_hits.load(Ordering::Relaxed)
    }

    pub fn projections_requested(&self) -> u64 {
        self.projections_requested.load(Ordering::Relaxed)
    }

    pub fn projection_failures(&self) -> u64 {
        self.projection_failures.load(Ordering::Relaxed)
    }

    pub fn route_mismatches(&self) -> u64 {
        self.route_mismatches.load(Ordering::Relaxed)
    }

    pub fn malformed_records(&self) -> u64 {
        self.malformed_records.load(Ordering::Relaxed)
    }

    /// Build a summary; latency histogram counters are reset
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let buckets = swap_buckets(&self.projection_latency_buckets);
        let latency_sum = self.projection_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.projection_latency_max_us.swap(0, Ordering::Relaxed);
        let samples: u64 = buckets.iter().sum();

        MetricsSummary {
            elapsed_secs,
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            projections_requested: self.projections_requested.load(Ordering::Relaxed),
            projection_cache_hits: self.projection_cache_hits.load(Ordering::Relaxed),
            projection_failures: self.projection_failures.load(Ordering::Relaxed),
            projection_lat_avg_us: if samples > 0 { latency_sum / samples } else { 0 },
            projection_lat_max_us: latency_max,
            projection_lat_p50_us: percentile_from_buckets(&buckets, 0.50),
            projection_lat_p99_us: percentile_from_buckets(&buckets, 0.99),
            route_mismatches: self.route_mismatches.load(Ordering::Relaxed),
            malformed_records: self.malformed_records.load(Ordering::Relaxed),
            stale_observations: self.stale_observations.load(Ordering::Relaxed),
            pairs_tested: self.pairs_tested.load(Ordering::Relaxed),
            pairs_matched: self.pairs_matched.load(Ordering::Relaxed),
            rejected_no_overlap: self.rejected_no_overlap.load(Ordering::Relaxed),
            rejected_direction: self.rejected_direction.load(Ordering::Relaxed),
            rejected_window: self.rejected_window.load(Ordering::Relaxed),
            rejected_route: self.rejected_route.load(Ordering::Relaxed),
            enrichments_total: self.enrichments_total.load(Ordering::Relaxed),
            combiner_declined: self.combiner_declined.load(Ordering::Relaxed),
            emitted_total: self.emitted_total.load(Ordering::Relaxed),
        }
    }
}

/// Summary of metrics for reporting
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub elapsed_secs: f64,
    pub cycles_total: u64,
    pub projections_requested: u64,
    pub projection_cache_hits: u64,
    pub projection_failures: u64,
    /// Average route service latency since last report (µs)
    pub projection_lat_avg_us: u64,
    pub projection_lat_max_us: u64,
    pub projection_lat_p50_us: u64,
    pub projection_lat_p99_us: u64,
    pub route_mismatches: u64,
    pub malformed_records: u64,
    pub stale_observations: u64,
    pub pairs_tested: u64,
    pub pairs_matched: u64,
    pub rejected_no_overlap: u64,
    pub rejected_direction: u64,
    pub rejected_window: u64,
    pub rejected_route: u64,
    pub enrichments_total: u64,
    pub combiner_declined: u64,
    pub emitted_total: u64,
}

impl MetricsSummary {
    /// Fraction of projections served from the cache
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.projections_requested + self.projection_cache_hits;
        if total == 0 {
            0.0
        } else {
            self.projection_cache_hits as f64 / total as f64
        }
    }

    pub fn log(&self) {
        info!(
            cycles = %self.cycles_total,
            projections = %self.projections_requested,
            cache_hit_ratio = format!("{:.2}", self.cache_hit_ratio()),
            projection_failures = %self.projection_failures,
            projection_p50_us = %self.projection_lat_p50_us,
            projection_p99_us = %self.projection_lat_p99_us,
            route_mismatches = %self.route_mismatches,
            malformed = %self.malformed_records,
            stale = %self.stale_observations,
            pairs_tested = %self.pairs_tested,
            pairs_matched = %self.pairs_matched,
            rejected_overlap = %self.rejected_no_overlap,
            rejected_direction = %self.rejected_direction,
            rejected_window = %self.rejected_window,
            enrichments = %self.enrichments_total,
            declined = %self.combiner_declined,
            emitted = %self.emitted_total,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(500), 0);
        assert_eq!(bucket_index(1_000), 0);
        assert_eq!(bucket_index(1_001), 1);
        assert_eq!(bucket_index(600_000), 10);
    }

    #[test]
    fn test_record_pair_by_verdict() {
        let metrics = Metrics::new();
        metrics.record_pair(Ok(()));
        metrics.record_pair(Err(Rejection::Direction));
        metrics.record_pair(Err(Rejection::Direction));
        metrics.record_pair(Err(Rejection::NoOverlap));

        let summary = metrics.report();
        assert_eq!(summary.pairs_tested, 4);
        assert_eq!(summary.pairs_matched, 1);
        assert_eq!(summary.rejected_direction, 2);
        assert_eq!(summary.rejected_no_overlap, 1);
        assert_eq!(summary.rejected_window, 0);
    }

    #[test]
    fn test_report_resets_latency_only() {
        let metrics = Metrics::new();
        metrics.record_projection_request(1_500);
        metrics.record_projection_request(3_000);
        metrics.record_cache_hit();

        let first = metrics.report();
        assert_eq!(first.projections_requested, 2);
        assert_eq!(first.projection_lat_avg_us, 2_250);
        assert_eq!(first.projection_lat_max_us, 3_000);
        assert_eq!(first.projection_lat_p50_us, 2_000);
        assert_eq!(first.projection_lat_p99_us, 4_000);
        assert!((first.cache_hit_ratio() - 1.0 / 3.0).abs() < 1e-9);

        let second = metrics.report();
        assert_eq!(second.projections_requested, 2);
        assert_eq!(second.projection_lat_avg_us, 0);
        assert_eq!(second.projection_lat_max_us, 0);
    }

    #[test]
    fn test_enrichment_counters() {
        let metrics = Metrics::new();
        metrics.record_enrichment(true);
        metrics.record_enrichment(false);
        metrics.record_emitted(3);
        let summary = metrics.report();
        assert_eq!(summary.enrichments_total, 1);
        assert_eq!(summary.combiner_declined, 1);
        assert_eq!(summary.emitted_total, 3);
    }
}
