//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// How many planned events one observation may enrich
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// First accepted planned event per observation, in input order
    #[default]
    FirstMatch,
    /// Every accepted planned event
    AllMatches,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::FirstMatch => "first_match",
            MatchStrategy::AllMatches => "all_matches",
        }
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_match" => Ok(MatchStrategy::FirstMatch),
            "all_matches" => Ok(MatchStrategy::AllMatches),
            other => Err(format!("unknown match strategy '{other}' (expected first_match or all_matches)")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteServiceConfig {
    #[serde(default = "default_route_service_url")]
    pub base_url: String,
    #[serde(default = "default_route_service_timeout_ms")]
    pub timeout_ms: u64,
    /// Points farther than this from any route are not projected (miles)
    #[serde(default = "default_search_radius_mi")]
    pub search_radius_mi: f64,
}

impl Default for RouteServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_route_service_url(),
            timeout_ms: default_route_service_timeout_ms(),
            search_radius_mi: default_search_radius_mi(),
        }
    }
}

fn default_route_service_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_route_service_timeout_ms() -> u64 {
    5000
}

fn default_search_radius_mi() -> f64 {
    0.1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionConfig {
    /// Maximum concurrent route service requests
    #[serde(default = "default_projection_workers")]
    pub workers: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { workers: default_projection_workers() }
    }
}

fn default_projection_workers() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub strategy: MatchStrategy,
    /// Tolerance applied when either side is a single point (miles)
    #[serde(default = "default_point_tolerance_mi")]
    pub point_tolerance_mi: f64,
    /// Maximum age of an observation's last update
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    /// Allowed overhang of an observation's validity beyond the event's
    #[serde(default = "default_window_slack_days")]
    pub window_slack_days: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::default(),
            point_tolerance_mi: default_point_tolerance_mi(),
            freshness_window_secs: default_freshness_window_secs(),
            window_slack_days: default_window_slack_days(),
        }
    }
}

fn default_point_tolerance_mi() -> f64 {
    0.25
}

fn default_freshness_window_secs() -> u64 {
    2 * 60 * 60
}

fn default_window_slack_days() -> u64 {
    31
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttenuatorConfig {
    #[serde(default = "default_lookahead_secs")]
    pub lookahead_secs: u64,
    /// Speed used instead of the observed one when the vehicle is slower
    #[serde(default = "default_floor_speed_mph")]
    pub floor_speed_mph: f64,
}

impl Default for AttenuatorConfig {
    fn default() -> Self {
        Self { lookahead_secs: default_lookahead_secs(), floor_speed_mph: default_floor_speed_mph() }
    }
}

fn default_lookahead_secs() -> u64 {
    1800
}

fn default_floor_speed_mph() -> f64 {
    5.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDeviceConfig {
    /// How far a recently completed event's end is pushed out
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

impl Default for FieldDeviceConfig {
    fn default() -> Self {
        Self { grace_secs: default_grace_secs() }
    }
}

fn default_grace_secs() -> u64 {
    2 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Planned event feed(s), JSON
    #[serde(default = "default_events_file")]
    pub events: String,
    /// Observations, JSON Lines
    #[serde(default = "default_observations_file")]
    pub observations: String,
    /// Enriched feeds, JSON Lines
    #[serde(default = "default_output_file")]
    pub output: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            events: default_events_file(),
            observations: default_observations_file(),
            output: default_output_file(),
        }
    }
}

fn default_events_file() -> String {
    "data/planned_events.json".to_string()
}

fn default_observations_file() -> String {
    "data/observations.jsonl".to_string()
}

fn default_output_file() -> String {
    "enriched.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// A cycle running longer than this is abandoned
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { cycle_timeout_secs: default_cycle_timeout_secs() }
    }
}

fn default_cycle_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub route_service: RouteServiceConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub attenuator: AttenuatorConfig,
    #[serde(default)]
    pub field_device: FieldDeviceConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    route_service_url: String,
    route_service_timeout_ms: u64,
    search_radius_mi: f64,
    projection_workers: usize,
    match_strategy: MatchStrategy,
    point_tolerance_mi: f64,
    freshness_window_secs: u64,
    window_slack_days: u64,
    lookahead_secs: u64,
    floor_speed_mph: f64,
    field_device_grace_secs: u64,
    events_file: String,
    observations_file: String,
    output_file: String,
    cycle_timeout_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            route_service_url: toml_config.route_service.base_url,
            route_service_timeout_ms: toml_config.route_service.timeout_ms,
            search_radius_mi: toml_config.route_service.search_radius_mi,
            projection_workers: toml_config.projection.workers.max(1),
            match_strategy: toml_config.matching.strategy,
            point_tolerance_mi: toml_config.matching.point_tolerance_mi,
            freshness_window_secs: toml_config.matching.freshness_window_secs,
            window_slack_days: toml_config.matching.window_slack_days,
            lookahead_secs: toml_config.attenuator.lookahead_secs,
            floor_speed_mph: toml_config.attenuator.floor_speed_mph,
            field_device_grace_secs: toml_config.field_device.grace_secs,
            events_file: toml_config.files.events,
            observations_file: toml_config.files.observations,
            output_file: toml_config.files.output,
            cycle_timeout_secs: toml_config.engine.cycle_timeout_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    // Getters for all config fields
    pub fn route_service_url(&self) -> &str {
        &self.route_service_url
    }

    pub fn route_service_timeout(&self) -> Duration {
        Duration::from_millis(self.route_service_timeout_ms)
    }

    pub fn search_radius_mi(&self) -> f64 {
        self.search_radius_mi
    }

    pub fn projection_workers(&self) -> usize {
        self.projection_workers
    }

    pub fn match_strategy(&self) -> MatchStrategy {
        self.match_strategy
    }

    pub fn point_tolerance_mi(&self) -> f64 {
        self.point_tolerance_mi
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_window_secs as i64)
    }

    pub fn window_slack(&self) -> chrono::Duration {
        chrono::Duration::days(self.window_slack_days as i64)
    }

    pub fn lookahead_secs(&self) -> u64 {
        self.lookahead_secs
    }

    pub fn floor_speed_mph(&self) -> f64 {
        self.floor_speed_mph
    }

    pub fn field_device_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.field_device_grace_secs as i64)
    }

    pub fn events_file(&self) -> &str {
        &self.events_file
    }

    pub fn observations_file(&self) -> &str {
        &self.observations_file
    }

    pub fn output_file(&self) -> &str {
        &self.output_file
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to pick a match strategy
    pub fn with_match_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.match_strategy = strategy;
        self
    }

    /// Builder method for tests to set the attenuator look-ahead
    pub fn with_lookahead_secs(mut self, secs: u64) -> Self {
        self.lookahead_secs = secs;
        self
    }

    /// Override input and output paths (command line takes precedence over TOML)
    pub fn with_files(
        mut self,
        events: Option<String>,
        observations: Option<String>,
        output: Option<String>,
    ) -> Self {
        if let Some(events) = events {
            self.events_file = events;
        }
        if let Some(observations) = observations {
            self.observations_file = observations;
        }
        if let Some(output) = output {
            self.output_file = output;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_strategy_from_str() {
        assert_eq!("all_matches".parse::<MatchStrategy>(), Ok(MatchStrategy::AllMatches));
        assert_eq!("first_match".parse::<MatchStrategy>(), Ok(MatchStrategy::FirstMatch));
        assert!("best_match".parse::<MatchStrategy>().is_err());
    }

    #[test]
    fn test_with_files_overrides_only_given_paths() {
        let config = Config::default().with_files(None, Some("obs.jsonl".to_string()), None);
        assert_eq!(config.observations_file(), "obs.jsonl");
        assert_eq!(config.events_file(), Config::default().events_file());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.route_service_url(), "http://localhost:8080");
        assert_eq!(config.match_strategy(), MatchStrategy::FirstMatch);
        assert_eq!(config.point_tolerance_mi(), 0.25);
        assert_eq!(config.freshness_window(), chrono::Duration::hours(2));
        assert_eq!(config.window_slack(), chrono::Duration::days(31));
        assert_eq!(config.lookahead_secs(), 1800);
        assert_eq!(config.field_device_grace(), chrono::Duration::hours(2));
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[matching]
strategy = "all_matches"

[projection]
workers = 0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline");
        assert_eq!(config.match_strategy(), MatchStrategy::AllMatches);
        assert_eq!(config.freshness_window(), chrono::Duration::hours(2));
        // At least one worker is always available
        assert_eq!(config.projection_workers(), 1);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["road-event-fusion".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "road-event-fusion".to_string(),
            "--config".to_string(),
            "config/prod.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["road-event-fusion".to_string(), "--config=config/staging.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/staging.toml");
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result: Result<TomlConfig, _> = toml::from_str("[matching]\nstrategy = \"best_match\"\n");
        assert!(result.is_err());
    }
}
