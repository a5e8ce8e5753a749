//! Input loading: planned event feeds and observation streams
//!
//! Feeds file: one FeatureCollection, or a JSON array of them.
//! Observations file: JSON Lines, one observation per line.
//!
//! A record that cannot be used is skipped with a warning and counted;
//! only an unreadable or unparseable file is an error.

use crate::domain::error::MalformedRecord;
use crate::domain::event::PlannedEvent;
use crate::domain::feed::{EventFeature, FeatureCollection};
use crate::domain::observation::{Observation, RawObservation};
use crate::infra::metrics::Metrics;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedFile {
    Many(Vec<FeatureCollection>),
    One(FeatureCollection),
}

/// Usable records plus the count of skipped ones
#[derive(Debug)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub malformed: usize,
}

impl<T> Ingested<T> {
    fn new() -> Self {
        Self { records: Vec::new(), malformed: 0 }
    }

    fn skip(&mut self, error: &MalformedRecord, source: &str, metrics: &Metrics) {
        warn!(source = %source, error = %error, "malformed_record_skipped");
        metrics.record_malformed();
        self.malformed += 1;
    }
}

/// Deserialize one record, naming it by its `id` when it has one
fn decode<T: DeserializeOwned>(value: Value, index: usize) -> Result<T, MalformedRecord> {
    let id = match value.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => "<unknown>".to_string(),
    };
    serde_json::from_value(value).map_err(|e| MalformedRecord::Unparseable { id, index, reason: e.to_string() })
}

/// Parse planned events from feed JSON
pub fn parse_feeds(text: &str, metrics: &Metrics) -> anyhow::Result<Ingested<PlannedEvent>> {
    let feeds = match serde_json::from_str::<FeedFile>(text).context("feeds are not a FeatureCollection or an array of them")? {
        FeedFile::Many(feeds) => feeds,
        FeedFile::One(feed) => vec![feed],
    };

    let mut ingested = Ingested::new();
    let mut index = 0;
    for feed in feeds {
        let header = Arc::new(feed.header);
        for value in feed.features {
            let parsed = decode::<EventFeature>(value, index)
                .and_then(|feature| PlannedEvent::from_feature(feature, header.clone()));
            match parsed {
                Ok(event) => ingested.records.push(event),
                Err(e) => ingested.skip(&e, "planned_events", metrics),
            }
            index += 1;
        }
    }
    Ok(ingested)
}

/// Parse observations from JSON Lines; blank lines are ignored
pub fn parse_observations(text: &str, metrics: &Metrics) -> Ingested<Observation> {
    let mut ingested = Ingested::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<Value>(line)
            .map_err(|e| MalformedRecord::Unparseable {
                id: "<unknown>".to_string(),
                index,
                reason: e.to_string(),
            })
            .and_then(|value| decode::<RawObservation>(value, index))
            .and_then(Observation::try_from);
        match parsed {
            Ok(observation) => ingested.records.push(observation),
            Err(e) => ingested.skip(&e, "observations", metrics),
        }
    }
    ingested
}

pub fn load_planned_events<P: AsRef<Path>>(path: P, metrics: &Metrics) -> anyhow::Result<Ingested<PlannedEvent>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read planned events from {}", path.display()))?;
    let ingested =
        parse_feeds(&text, metrics).with_context(|| format!("failed to parse {}", path.display()))?;
    info!(
        file = %path.display(),
        events = %ingested.records.len(),
        malformed = %ingested.malformed,
        "planned_events_loaded"
    );
    Ok(ingested)
}

pub fn load_observations<P: AsRef<Path>>(path: P, metrics: &Metrics) -> anyhow::Result<Ingested<Observation>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read observations from {}", path.display()))?;
    let ingested = parse_observations(&text, metrics);
    info!(
        file = %path.display(),
        observations = %ingested.records.len(),
        malformed = %ingested.malformed,
        "observations_loaded"
    );
    Ok(ingested)
}
