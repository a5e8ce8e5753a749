//! Match gate: overlap, directionality and recency predicates
//!
//! Every candidate (observation, planned event) pair sharing a route bucket
//! goes through `MatchGate::evaluate`. Freshness is checked earlier, before
//! projection, through `MatchGate::admits`.

use crate::domain::event::PlannedEvent;
use crate::domain::observation::{DirectionPolicy, Observation};
use crate::domain::types::{Direction, Located, LocationRange};
use crate::infra::config::Config;
use chrono::{DateTime, Duration, Utc};

/// Why a candidate pair was not matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    RouteMismatch,
    NoOverlap,
    Direction,
    OutsideWindow,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::RouteMismatch => "route_mismatch",
            Rejection::NoOverlap => "no_overlap",
            Rejection::Direction => "direction",
            Rejection::OutsideWindow => "outside_window",
        }
    }
}

/// Whether two ranges share any stretch of road.
///
/// Point ranges get `tolerance_mi` of slack; two bounded ranges must
/// intersect exactly.
pub fn overlaps(a: &LocationRange, b: &LocationRange, tolerance_mi: f64) -> bool {
    if a.route_id() != b.route_id() {
        return false;
    }
    match (a.is_point(), b.is_point()) {
        (false, false) => a.low() <= b.high() && b.low() <= a.high(),
        (true, true) => (a.low() - b.low()).abs() <= tolerance_mi,
        (true, false) => within_tolerance(a.low(), b, tolerance_mi),
        (false, true) => within_tolerance(b.low(), a, tolerance_mi),
    }
}

#[inline]
fn within_tolerance(measure: f64, range: &LocationRange, tolerance_mi: f64) -> bool {
    measure >= range.low() - tolerance_mi && measure <= range.high() + tolerance_mi
}

/// Direction an observation is travelling, as judged against an event.
///
/// A bearing is snapped onto the event's axis. Without one, the stated
/// direction is used as is.
pub fn observed_direction(observation: &Observation, event_direction: Direction) -> Direction {
    match (observation.bearing, event_direction.axis()) {
        (Some(bearing), Some(axis)) => axis.snap(bearing),
        _ => observation.direction,
    }
}

pub fn direction_matches(policy: DirectionPolicy, observed: Direction, stated: Direction) -> bool {
    match policy {
        DirectionPolicy::Strict => observed.is_known() && observed == stated,
        DirectionPolicy::Lenient => !observed.is_known() || observed == stated,
    }
}

/// Observation updated no longer than `window` ago. Future timestamps count as fresh.
pub fn is_fresh(updated_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - updated_at <= window
}

/// Observation validity lies within the event's dates, give or take `slack`.
/// An event with no end date never rejects on the end side.
pub fn within_window(
    validity: (DateTime<Utc>, DateTime<Utc>),
    event_start: DateTime<Utc>,
    event_end: Option<DateTime<Utc>>,
    slack: Duration,
) -> bool {
    let (start, end) = validity;
    if start < event_start - slack {
        return false;
    }
    match event_end {
        Some(event_end) => end <= event_end + slack,
        None => true,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    pub point_tolerance_mi: f64,
    pub freshness_window: Duration,
    pub window_slack: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            point_tolerance_mi: 0.25,
            freshness_window: Duration::hours(2),
            window_slack: Duration::days(31),
        }
    }
}

impl GateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            point_tolerance_mi: config.point_tolerance_mi(),
            freshness_window: config.freshness_window(),
            window_slack: config.window_slack(),
        }
    }
}

/// Predicates evaluated at one reference time
#[derive(Debug, Clone, Copy)]
pub struct MatchGate {
    settings: GateSettings,
    now: DateTime<Utc>,
}

impl MatchGate {
    pub fn new(settings: GateSettings, now: DateTime<Utc>) -> Self {
        Self { settings, now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Freshness check for kinds whose profile requires it
    pub fn admits(&self, observation: &Observation) -> bool {
        !observation.kind().checks_freshness()
            || is_fresh(observation.updated_at, self.now, self.settings.freshness_window)
    }

    /// Overlap, then direction, then (for windowed kinds) validity dates
    pub fn evaluate(
        &self,
        observation: &Located<Observation>,
        event: &Located<PlannedEvent>,
    ) -> Result<(), Rejection> {
        if observation.range.route_id() != event.range.route_id() {
            return Err(Rejection::RouteMismatch);
        }
        if !overlaps(&observation.range, &event.range, self.settings.point_tolerance_mi) {
            return Err(Rejection::NoOverlap);
        }

        let obs = &observation.entity;
        let kind = obs.kind();
        let stated = event.entity.direction();
        let observed = observed_direction(obs, stated);
        if !direction_matches(kind.direction_policy(), observed, stated) {
            return Err(Rejection::Direction);
        }

        if kind.checks_window() {
            if let Some(validity) = obs.validity() {
                if !within_window(
                    validity,
                    event.entity.start_date(),
                    event.entity.end_date(),
                    self.settings.window_slack,
                ) {
                    return Err(Rejection::OutsideWindow);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::test_support::planned_event;
    use crate::domain::observation::{
        AttenuatorTelemetry, FieldDeviceStatus, ObservationPayload, SpeedReduction,
    };
    use crate::domain::types::test_support::{bounded, point};
    use crate::domain::types::GeoPoint;
    use chrono::TimeZone;
    use serde_json::json;

    const TOL: f64 = 0.25;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn observation(payload: ObservationPayload, bearing: Option<f64>, direction: Direction) -> Observation {
        Observation {
            id: "obs-1".to_string(),
            updated_at: now(),
            bearing,
            direction,
            geometry: vec![GeoPoint::new(-104.9, 39.6)],
            payload,
        }
    }

    fn attenuator(bearing: Option<f64>, direction: Direction) -> Observation {
        observation(
            ObservationPayload::AttenuatorTelemetry(AttenuatorTelemetry {
                vehicle_id: "TMA-7".to_string(),
                speed_mph: 25.0,
            }),
            bearing,
            direction,
        )
    }

    fn field_device(direction: Direction) -> Observation {
        observation(
            ObservationPayload::FieldDeviceStatus(FieldDeviceStatus {
                device_id: "arrow-1".to_string(),
                device_type: "arrow_board".to_string(),
                description: None,
                raw: json!({}),
            }),
            None,
            direction,
        )
    }

    #[test]
    fn test_overlap_symmetric_and_reflexive() {
        let ranges = [
            bounded("159A", 1.0, 2.0),
            bounded("159A", 2.0, 1.0),
            bounded("159A", 1.5, 3.0),
            bounded("159A", 2.1, 3.0),
            bounded("025A", 1.0, 2.0),
            point("159A", 2.2),
            point("159A", 0.5),
            point("159A", 5.0),
        ];
        for a in &ranges {
            assert!(overlaps(a, a, TOL), "{a:?} must overlap itself");
            for b in &ranges {
                assert_eq!(overlaps(a, b, TOL), overlaps(b, a, TOL), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_point_tolerance_boundary() {
        let range = bounded("159A", 1.0, 2.0);
        assert!(!overlaps(&point("159A", 2.26), &range, TOL));
        assert!(overlaps(&point("159A", 2.24), &range, TOL));
        assert!(overlaps(&point("159A", 0.76), &range, TOL));
        assert!(!overlaps(&point("159A", 0.74), &range, TOL));
    }

    #[test]
    fn test_bounded_ranges_have_no_tolerance() {
        let range = bounded("159A", 1.0, 2.0);
        assert!(overlaps(&bounded("159A", 2.0, 3.0), &range, TOL));
        assert!(!overlaps(&bounded("159A", 2.1, 3.0), &range, TOL));
        // Reversed endpoints describe the same stretch
        assert!(overlaps(&bounded("159A", 3.0, 1.5), &range, TOL));
    }

    #[test]
    fn test_point_pair_tolerance() {
        assert!(overlaps(&point("159A", 1.0), &point("159A", 1.2), TOL));
        assert!(!overlaps(&point("159A", 1.0), &point("159A", 1.3), TOL));
    }

    #[test]
    fn test_different_routes_never_overlap() {
        assert!(!overlaps(&point("159A", 1.0), &point("025A", 1.0), TOL));
        assert!(!overlaps(&bounded("159A", 0.0, 9.0), &bounded("025A", 0.0, 9.0), TOL));
    }

    #[test]
    fn test_bearing_snaps_to_event_axis() {
        let obs = attenuator(Some(215.0), Direction::Unknown);
        assert_eq!(observed_direction(&obs, Direction::Southbound), Direction::Southbound);
        assert_eq!(observed_direction(&obs, Direction::Northbound), Direction::Southbound);
        // 215 degrees is closer to west than east
        assert_eq!(observed_direction(&obs, Direction::Eastbound), Direction::Westbound);
    }

    #[test]
    fn test_without_bearing_stated_direction_is_used() {
        let obs = field_device(Direction::Eastbound);
        assert_eq!(observed_direction(&obs, Direction::Westbound), Direction::Eastbound);
        let unknown = field_device(Direction::Unknown);
        assert_eq!(observed_direction(&unknown, Direction::Eastbound), Direction::Unknown);
    }

    #[test]
    fn test_bearing_without_event_axis_falls_back_to_stated() {
        let obs = attenuator(Some(215.0), Direction::Southbound);
        assert_eq!(observed_direction(&obs, Direction::Unknown), Direction::Southbound);
    }

    #[test]
    fn test_direction_policies() {
        use Direction::*;
        assert!(direction_matches(DirectionPolicy::Strict, Northbound, Northbound));
        assert!(!direction_matches(DirectionPolicy::Strict, Southbound, Northbound));
        assert!(!direction_matches(DirectionPolicy::Strict, Unknown, Northbound));
        assert!(direction_matches(DirectionPolicy::Lenient, Unknown, Northbound));
        assert!(direction_matches(DirectionPolicy::Lenient, Northbound, Northbound));
        assert!(!direction_matches(DirectionPolicy::Lenient, Southbound, Northbound));
    }

    #[test]
    fn test_freshness() {
        let window = Duration::hours(2);
        assert!(is_fresh(now() - Duration::minutes(119), now(), window));
        assert!(!is_fresh(now() - Duration::hours(3), now(), window));
        assert!(is_fresh(now() + Duration::minutes(5), now(), window));
    }

    #[test]
    fn test_window() {
        let slack = Duration::days(31);
        let start = now();
        let end = Some(now() + Duration::days(10));
        assert!(within_window((start, start + Duration::days(3)), start, end, slack));
        assert!(!within_window((start - Duration::days(32), start), start, end, slack));
        assert!(!within_window((start, start + Duration::days(42)), start, end, slack));
        assert!(within_window((start, start + Duration::days(400)), start, None, slack));
    }

    #[test]
    fn test_admits_only_checks_freshness_profiles() {
        let gate = MatchGate::new(GateSettings::default(), now());
        let mut stale_device = field_device(Direction::Unknown);
        stale_device.updated_at = now() - Duration::hours(3);
        assert!(!gate.admits(&stale_device));

        let mut stale_reduction = observation(
            ObservationPayload::SpeedReductionSubmission(SpeedReduction {
                permit_id: "P-1".to_string(),
                reduced_speed_limit_kph: 72.0,
                start_date: now(),
                end_date: now() + Duration::days(1),
            }),
            None,
            Direction::Northbound,
        );
        stale_reduction.updated_at = now() - Duration::days(30);
        assert!(gate.admits(&stale_reduction));
    }

    #[test]
    fn test_evaluate_order_of_rejections() {
        let gate = MatchGate::new(GateSettings::default(), now());
        let event = Located::new(
            planned_event("evt-1", "northbound", now(), Some(now() + Duration::days(5))),
            bounded("159A", 10.0, 12.0),
        );

        let on_other_route = Located::new(attenuator(Some(0.0), Direction::Unknown), point("025A", 11.0));
        assert_eq!(gate.evaluate(&on_other_route, &event), Err(Rejection::RouteMismatch));

        let far = Located::new(attenuator(Some(0.0), Direction::Unknown), point("159A", 20.0));
        assert_eq!(gate.evaluate(&far, &event), Err(Rejection::NoOverlap));

        let wrong_way = Located::new(attenuator(Some(180.0), Direction::Unknown), point("159A", 11.0));
        assert_eq!(gate.evaluate(&wrong_way, &event), Err(Rejection::Direction));

        let ok = Located::new(attenuator(Some(10.0), Direction::Unknown), point("159A", 11.0));
        assert_eq!(gate.evaluate(&ok, &event), Ok(()));
    }

    #[test]
    fn test_evaluate_window_for_windowed_kinds() {
        let gate = MatchGate::new(GateSettings::default(), now());
        let event = Located::new(
            planned_event("evt-1", "northbound", now(), Some(now() + Duration::days(5))),
            bounded("159A", 10.0, 12.0),
        );
        let late = observation(
            ObservationPayload::SpeedReductionSubmission(SpeedReduction {
                permit_id: "P-1".to_string(),
                reduced_speed_limit_kph: 72.0,
                start_date: now() + Duration::days(60),
                end_date: now() + Duration::days(61),
            }),
            None,
            Direction::Northbound,
        );
        let located = Located::new(late, point("159A", 11.0));
        assert_eq!(gate.evaluate(&located, &event), Err(Rejection::OutsideWindow));
    }
}
