//! hookdrain-core — shared types for the lifecycle drain controller.
//!
//! Defines the request/state/resolution model, parses the lifecycle
//! events that start a drain, loads `hookdrain.toml`, and declares the
//! `MetricSource` and `LifecycleController` seams the decision loop is
//! written against.

pub mod collaborator;
pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use collaborator::{CallFuture, LifecycleController, MetricSource};
pub use config::{DrainSettings, HookdrainConfig, SchedulerSettings};
pub use error::{ConfigError, DrainError};
pub use event::LifecycleEvent;
pub use types::*;
