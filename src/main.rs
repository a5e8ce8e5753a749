//! Road event fusion - enriches planned road events with field observations
//!
//! Runs one fusion cycle: loads planned event feeds and observations,
//! matches them along routes resolved by the route service, and writes the
//! enriched events as single-feature feeds.
//!
//! Module structure:
//! - `domain/` - Core types (PlannedEvent, Observation, linear locations, feeds)
//! - `io/` - External interfaces (route service HTTP client, ingest, egress)
//! - `services/` - Fusion pipeline (projection, gate, matcher, combiners, engine)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use road_event_fusion::infra::{Config, MatchStrategy, Metrics};
use road_event_fusion::io::{load_observations, load_planned_events, FeedEgress, HttpRouteService};
use road_event_fusion::services::{FusionEngine, MemoryCache};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Road event fusion - one enrichment cycle
#[derive(Parser, Debug)]
#[command(name = "road-event-fusion", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Planned event feeds file (overrides [files] events)
    #[arg(long)]
    events: Option<String>,

    /// Observations JSONL file (overrides [files] observations)
    #[arg(long)]
    observations: Option<String>,

    /// Output JSONL file (overrides [files] output)
    #[arg(short, long)]
    output: Option<String>,

    /// first_match or all_matches (overrides [matching] strategy)
    #[arg(long)]
    strategy: Option<MatchStrategy>,

    /// Reference time for the cycle, RFC 3339 (default: now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-pair decisions
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("road-event-fusion starting");

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path).with_files(
        args.events.clone(),
        args.observations.clone(),
        args.output.clone(),
    );
    if let Some(strategy) = args.strategy {
        config = config.with_match_strategy(strategy);
    }

    info!(
        config_file = %config.config_file(),
        route_service_url = %config.route_service_url(),
        projection_workers = %config.projection_workers(),
        match_strategy = %config.match_strategy().as_str(),
        point_tolerance_mi = %config.point_tolerance_mi(),
        lookahead_secs = %config.lookahead_secs(),
        events_file = %config.events_file(),
        observations_file = %config.observations_file(),
        output_file = %config.output_file(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let events = load_planned_events(config.events_file(), &metrics)?;
    let observations = load_observations(config.observations_file(), &metrics)?;

    let service = Arc::new(HttpRouteService::from_config(&config)?);
    let engine = FusionEngine::new(&config, service, Arc::new(MemoryCache::new()), metrics.clone());

    let now = args.now.unwrap_or_else(Utc::now);
    let output = tokio::time::timeout(
        config.cycle_timeout(),
        engine.run_cycle(observations.records, events.records, now),
    )
    .await
    .with_context(|| format!("fusion cycle exceeded {}s, result discarded", config.cycle_timeout().as_secs()))?;

    let egress = FeedEgress::new(config.output_file());
    let written = egress.write_events(&output.enriched);

    metrics.report().log();

    if written < output.enriched.len() {
        anyhow::bail!(
            "wrote {written} of {} enriched events to {}",
            output.enriched.len(),
            config.output_file()
        );
    }

    info!(emitted = %written, "road-event-fusion complete");
    Ok(())
}
