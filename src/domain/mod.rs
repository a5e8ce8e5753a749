//! Domain models - canonical records and linear referencing types
//!
//! This module contains the canonical data types used throughout the engine:
//! - `PlannedEvent` - a planned road event awaiting enrichment
//! - `Observation` - field data from one of four source kinds
//! - `EnrichedEvent` - a planned event after a combiner merged an observation
//! - `LinearLocation` / `LocationRange` - positions along a named route
//! - `FeatureCollection` / `EventFeature` - wire shapes of the feeds

pub mod error;
pub mod event;
pub mod feed;
pub mod observation;
pub mod types;

// Re-export commonly used types at module level
pub use error::{MalformedRecord, MismatchedRoute};
pub use event::{EnrichedEvent, EventStatus, PlannedEvent, Provenance};
pub use observation::{DirectionPolicy, Observation, ObservationPayload, SourceKind};
pub use types::{Direction, GeoPoint, LinearLocation, Located, LocationRange, RouteId};
