//! Error types for records that cannot take part in matching

use crate::domain::types::RouteId;
use thiserror::Error;

/// The two endpoints of an entity resolved to different routes
#[derive(Error, Debug, Clone, PartialEq)]
#[error("endpoints resolve to different routes ({start} vs {end})")]
pub struct MismatchedRoute {
    pub start: RouteId,
    pub end: RouteId,
}

/// A canonical record missing something matching depends on.
///
/// The record is skipped for the whole cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRecord {
    #[error("record {id}: missing {field}")]
    MissingField { id: String, field: &'static str },

    #[error("record {id}: invalid {field}: {reason}")]
    InvalidField { id: String, field: &'static str, reason: String },

    #[error("record {id} at position {index}: {reason}")]
    Unparseable { id: String, index: usize, reason: String },
}

impl MalformedRecord {
    pub fn missing(id: impl Into<String>, field: &'static str) -> Self {
        MalformedRecord::MissingField { id: id.into(), field }
    }

    pub fn invalid(id: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        MalformedRecord::InvalidField { id: id.into(), field, reason: reason.into() }
    }
}
