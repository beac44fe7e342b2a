//! Error types for the drain decision loop.

use thiserror::Error;

use crate::types::{Resolution, ResolutionReason};

/// Errors raised while handling one drain request.
#[derive(Debug, Error)]
pub enum DrainError {
    /// The triggering event did not identify the pause. No external
    /// call is made and no resolution is possible.
    #[error("malformed drain request: {0}")]
    MalformedRequest(String),

    /// Extending the pause failed. Recovered locally; the cycle continues.
    #[error("heartbeat failed: {0}")]
    Heartbeat(String),

    /// The metric source failed. Forces an ABANDON resolution.
    #[error("metric query failed: {0}")]
    MetricQuery(String),

    /// The resolve call itself failed. Terminal; never retried.
    #[error("failed to resolve pause as {resolution} ({reason}): {message}")]
    Resolve {
        resolution: Resolution,
        reason: ResolutionReason,
        message: String,
    },

    /// A drain for the same pause is already being tracked.
    #[error("drain already in progress: {0}")]
    InProgress(String),

    /// Checkpoint persistence failed during scheduled re-entry.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

/// Errors raised while loading `hookdrain.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}
