//! Shared types for linear referencing and directionality

use crate::domain::error::MismatchedRoute;
use serde::{Deserialize, Serialize};

/// Newtype wrapper for route identifiers to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub String);

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RouteId {
    fn from(s: &str) -> Self {
        RouteId(s.to_string())
    }
}

/// Travel direction of a road event or observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Direction {
    Northbound,
    Southbound,
    Eastbound,
    Westbound,
    #[default]
    Unknown,
}

impl std::str::FromStr for Direction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "northbound" => Direction::Northbound,
            "southbound" => Direction::Southbound,
            "eastbound" => Direction::Eastbound,
            "westbound" => Direction::Westbound,
            _ => Direction::Unknown,
        })
    }
}

impl From<String> for Direction {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<Direction> for String {
    fn from(direction: Direction) -> Self {
        direction.as_str().to_string()
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Northbound => "northbound",
            Direction::Southbound => "southbound",
            Direction::Eastbound => "eastbound",
            Direction::Westbound => "westbound",
            Direction::Unknown => "unknown",
        }
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        *self != Direction::Unknown
    }

    /// Axis implied by this direction, if any
    pub fn axis(&self) -> Option<Axis> {
        match self {
            Direction::Northbound | Direction::Southbound => Some(Axis::NorthSouth),
            Direction::Eastbound | Direction::Westbound => Some(Axis::EastWest),
            Direction::Unknown => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orientation of a road segment: the pair of travel directions it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    NorthSouth,
    EastWest,
}

impl Axis {
    /// Compass bearings (degrees) of the two directions on this axis
    fn poles(&self) -> [(f64, Direction); 2] {
        match self {
            Axis::NorthSouth => [(0.0, Direction::Northbound), (180.0, Direction::Southbound)],
            Axis::EastWest => [(90.0, Direction::Eastbound), (270.0, Direction::Westbound)],
        }
    }

    /// Snap a compass bearing to the nearer direction on this axis.
    /// A bearing exactly between the two poles resolves to north/east.
    pub fn snap(&self, bearing_deg: f64) -> Direction {
        let [(first_deg, first), (second_deg, second)] = self.poles();
        if angular_distance(bearing_deg, first_deg) <= angular_distance(bearing_deg, second_deg) {
            first
        } else {
            second
        }
    }
}

/// Smallest angle between two compass bearings, in [0, 180]
#[inline]
pub fn angular_distance(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (a_deg - b_deg).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

/// A WGS84 coordinate. Canonical records carry these as `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self { lng: pair[0], lat: pair[1] }
    }

    /// Cache key for this coordinate (6 decimal places, roughly 10cm)
    pub fn cache_key(&self) -> String {
        format!("{:.6},{:.6}", self.lat, self.lng)
    }

    /// Cache key for a heading-aware lookup of this coordinate
    pub fn cache_key_with_heading(&self, bearing_deg: f64) -> String {
        format!("{}@{}", self.cache_key(), bearing_deg.rem_euclid(360.0).round() as i64)
    }
}

/// Raw answer from the route service for one coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResolution {
    pub route_id: RouteId,
    pub measure: f64,
    pub route_min: f64,
    pub route_max: f64,
    /// Distance from the input point to the route, in miles
    pub distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

/// A resolved position on a named route.
///
/// Only the route projector creates these (see `services::projector`).
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLocation {
    route_id: RouteId,
    measure: f64,
    route_min: f64,
    route_max: f64,
    lateral_offset: f64,
    heading_hint: Option<Direction>,
}

impl LinearLocation {
    /// Build from a service resolution. Lateral offset is kept in meters.
    pub(crate) fn from_resolution(resolution: RouteResolution) -> Self {
        Self {
            route_id: resolution.route_id,
            measure: resolution.measure,
            route_min: resolution.route_min,
            route_max: resolution.route_max,
            lateral_offset: resolution.distance * METERS_PER_MILE,
            heading_hint: resolution.direction.filter(Direction::is_known),
        }
    }

    pub fn route_id(&self) -> &RouteId {
        &self.route_id
    }

    pub fn measure(&self) -> f64 {
        self.measure
    }

    pub fn route_min(&self) -> f64 {
        self.route_min
    }

    pub fn route_max(&self) -> f64 {
        self.route_max
    }

    pub fn lateral_offset(&self) -> f64 {
        self.lateral_offset
    }

    pub fn heading_hint(&self) -> Option<Direction> {
        self.heading_hint
    }
}

pub const METERS_PER_MILE: f64 = 1609.344;

/// Extent of an entity along one route
#[derive(Debug, Clone, PartialEq)]
pub enum LocationRange {
    /// Only one endpoint is known
    Point(LinearLocation),
    Bounded { start: LinearLocation, end: LinearLocation },
}

impl LocationRange {
    /// Range from two endpoints, which must lie on the same route
    pub fn bounded(start: LinearLocation, end: LinearLocation) -> Result<Self, MismatchedRoute> {
        if start.route_id != end.route_id {
            return Err(MismatchedRoute {
                start: start.route_id.clone(),
                end: end.route_id.clone(),
            });
        }
        Ok(LocationRange::Bounded { start, end })
    }

    pub fn point(location: LinearLocation) -> Self {
        LocationRange::Point(location)
    }

    pub fn route_id(&self) -> &RouteId {
        match self {
            LocationRange::Point(loc) => loc.route_id(),
            LocationRange::Bounded { start, .. } => start.route_id(),
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, LocationRange::Point(_))
    }

    /// First endpoint (the only one for a point range)
    pub fn start(&self) -> &LinearLocation {
        match self {
            LocationRange::Point(loc) => loc,
            LocationRange::Bounded { start, .. } => start,
        }
    }

    /// Last endpoint (same as start for a point range)
    pub fn end(&self) -> &LinearLocation {
        match self {
            LocationRange::Point(loc) => loc,
            LocationRange::Bounded { end, .. } => end,
        }
    }

    /// Lower measure of the range
    pub fn low(&self) -> f64 {
        self.start().measure().min(self.end().measure())
    }

    /// Upper measure of the range
    pub fn high(&self) -> f64 {
        self.start().measure().max(self.end().measure())
    }
}

/// An entity together with its projected location
#[derive(Debug, Clone)]
pub struct Located<T> {
    pub entity: T,
    pub range: LocationRange,
}

impl<T> Located<T> {
    pub fn new(entity: T, range: LocationRange) -> Self {
        Self { entity, range }
    }
}
