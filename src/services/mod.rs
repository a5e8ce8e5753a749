//! Services - matching and enrichment logic
//!
//! This module contains the fusion pipeline:
//! - `projector` - Route projection through an injected route service and cache
//! - `projection_pool` - Bounded concurrent projection of entity endpoints
//! - `index` - Linear location index (entities bucketed by route)
//! - `gate` - Overlap, directionality and recency predicates
//! - `matcher` - Pairs observations with planned events
//! - `combiner` - Per-source merges producing enriched events
//! - `assembler` - Priority-ordered feed assembly
//! - `engine` - One fusion cycle end to end

pub mod assembler;
pub mod combiner;
pub mod engine;
pub mod gate;
pub mod index;
pub mod matcher;
pub mod projection_pool;
pub mod projector;

// Re-export commonly used types
pub use engine::{CycleOutput, CycleStats, FusionEngine};
pub use gate::{GateSettings, MatchGate, Rejection};
pub use projector::{
    GeometryAheadRequest, MemoryCache, NoCache, ProjectionCache, RouteProjector, RouteService, RouteSlice,
};
