//! Pairs observations with planned events on the same route
//!
//! Buckets are scanned observation-major in input order. With
//! `FirstMatch` each observation stops at its first accepted event;
//! with `AllMatches` every accepted pair is produced.

use crate::domain::event::PlannedEvent;
use crate::domain::observation::Observation;
use crate::domain::types::Located;
use crate::infra::config::MatchStrategy;
use crate::infra::metrics::Metrics;
use crate::services::gate::MatchGate;
use crate::services::index::LinearIndex;
use std::sync::Arc;
use tracing::debug;

/// An observation accepted against a planned event
#[derive(Debug, Clone, Copy)]
pub struct MatchedPair<'a> {
    pub observation: &'a Located<Observation>,
    pub event: &'a Located<PlannedEvent>,
}

/// Pairs evaluated and accepted by one matcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchTally {
    pub tested: usize,
    pub matched: usize,
}

pub struct Matcher {
    gate: MatchGate,
    strategy: MatchStrategy,
    tally: MatchTally,
    metrics: Arc<Metrics>,
}

impl Matcher {
    pub fn new(gate: MatchGate, strategy: MatchStrategy, metrics: Arc<Metrics>) -> Self {
        Self { gate, strategy, tally: MatchTally::default(), metrics }
    }

    pub fn gate(&self) -> &MatchGate {
        &self.gate
    }

    pub fn tally(&self) -> MatchTally {
        self.tally
    }

    /// Match one route's observations against the same route's events
    pub fn match_bucket<'a>(
        &mut self,
        observations: &'a [Located<Observation>],
        events: &'a [Located<PlannedEvent>],
    ) -> Vec<MatchedPair<'a>> {
        let mut pairs = Vec::new();

        for observation in observations {
            for event in events {
                let verdict = self.gate.evaluate(observation, event);
                self.metrics.record_pair(verdict);
                self.tally.tested += 1;

                match verdict {
                    Ok(()) => {
                        self.tally.matched += 1;
                        debug!(
                            observation_id = %observation.entity.id,
                            event_id = %event.entity.id(),
                            kind = %observation.entity.kind(),
                            route_id = %event.range.route_id(),
                            "pair_matched"
                        );
                        pairs.push(MatchedPair { observation, event });
                        if self.strategy == MatchStrategy::FirstMatch {
                            break;
                        }
                    }
                    Err(reason) => {
                        debug!(
                            observation_id = %observation.entity.id,
                            event_id = %event.entity.id(),
                            reason = %reason.as_str(),
                            heading_hint = ?observation.range.start().heading_hint(),
                            "pair_rejected"
                        );
                    }
                }
            }
        }

        pairs
    }

    /// Match every observation bucket against the event bucket on its route
    pub fn match_index<'a>(
        &mut self,
        observations: &'a LinearIndex<Observation>,
        events: &'a LinearIndex<PlannedEvent>,
    ) -> Vec<MatchedPair<'a>> {
        let mut pairs = Vec::new();
        for route_id in observations.routes() {
            pairs.extend(self.match_bucket(observations.bucket(route_id), events.bucket(route_id)));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::test_support::planned_event;
    use crate::domain::observation::{FieldDeviceStatus, ObservationPayload};
    use crate::domain::types::test_support::{bounded, point};
    use crate::domain::types::{Direction, GeoPoint};
    use crate::services::gate::GateSettings;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn device(id: &str) -> Observation {
        Observation {
            id: id.to_string(),
            updated_at: Utc::now(),
            bearing: None,
            direction: Direction::Unknown,
            geometry: vec![GeoPoint::new(-104.9, 39.6)],
            payload: ObservationPayload::FieldDeviceStatus(FieldDeviceStatus {
                device_id: id.to_string(),
                device_type: "arrow_board".to_string(),
                description: None,
                raw: json!({}),
            }),
        }
    }

    fn events() -> Vec<Located<PlannedEvent>> {
        let start = Utc::now() - Duration::days(1);
        vec![
            Located::new(planned_event("nb", "northbound", start, None), bounded("159A", 10.0, 12.0)),
            Located::new(planned_event("sb", "southbound", start, None), bounded("159A", 12.0, 10.0)),
            Located::new(planned_event("far", "northbound", start, None), bounded("159A", 40.0, 42.0)),
        ]
    }

    fn matcher(strategy: MatchStrategy) -> Matcher {
        Matcher::new(
            MatchGate::new(GateSettings::default(), Utc::now()),
            strategy,
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn test_first_match_stops_per_observation() {
        let events = events();
        let observations = vec![
            Located::new(device("d1"), point("159A", 11.0)),
            Located::new(device("d2"), point("159A", 11.5)),
        ];
        let mut matcher = matcher(MatchStrategy::FirstMatch);

        let pairs = matcher.match_bucket(&observations, &events);

        let ids: Vec<(&str, &str)> =
            pairs.iter().map(|p| (p.observation.entity.id.as_str(), p.event.entity.id())).collect();
        // Each observation gets its own first match; the second is not starved
        assert_eq!(ids, vec![("d1", "nb"), ("d2", "nb")]);
        assert_eq!(matcher.tally(), MatchTally { tested: 2, matched: 2 });
        assert_eq!(matcher.metrics.pairs_matched(), 2);
    }

    #[test]
    fn test_all_matches_emits_every_pair() {
        let events = events();
        let observations = vec![Located::new(device("d1"), point("159A", 11.0))];
        let mut matcher = matcher(MatchStrategy::AllMatches);

        let pairs = matcher.match_bucket(&observations, &events);

        let ids: Vec<&str> = pairs.iter().map(|p| p.event.entity.id()).collect();
        assert_eq!(ids, vec!["nb", "sb"]);
        assert_eq!(matcher.tally(), MatchTally { tested: 3, matched: 2 });
    }

    #[test]
    fn test_empty_event_bucket() {
        let observations = vec![Located::new(device("d1"), point("159A", 11.0))];
        let mut matcher = matcher(MatchStrategy::AllMatches);
        let pairs = matcher.match_bucket(&observations, &[]);
        assert!(pairs.is_empty());
    }
}
