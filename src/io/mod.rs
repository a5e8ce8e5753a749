//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `route_service` - HTTP client for the geospatial route service
//! - `ingest` - Planned event feeds and observation streams from file
//! - `egress` - Enriched feed output to file (JSONL format)

pub mod egress;
pub mod ingest;
pub mod route_service;

// Re-export commonly used types
pub use egress::FeedEgress;
pub use ingest::{load_observations, load_planned_events, Ingested};
pub use route_service::HttpRouteService;
