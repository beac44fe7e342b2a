//! Narrow interfaces to the two external services the loop consults.
//!
//! Both are injected into the loop rather than reached through global
//! clients, so tests and the standalone daemon can supply their own.
//! Errors cross the seam as plain strings; the loop decides which are
//! fatal.

use std::future::Future;
use std::pin::Pin;

use crate::types::{DrainRequest, MetricQuery, Resolution};

/// Boxed future alias for collaborator calls.
pub type CallFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// Answers "what was the peak of this metric over this window?".
pub trait MetricSource: Send + Sync {
    /// Aggregate the metric over the query window. `Ok(None)` means no
    /// data point exists in the window.
    fn query<'a>(&'a self, query: &'a MetricQuery) -> CallFuture<'a, Option<f64>>;
}

/// Controls the lifecycle pause holding an instance's termination.
pub trait LifecycleController: Send + Sync {
    /// Reset the pause's timeout (heartbeat).
    fn extend_pause<'a>(&'a self, request: &'a DrainRequest) -> CallFuture<'a, ()>;

    /// Release the pause with a terminal outcome. Resolving the same
    /// pause twice is an error on the controller's side.
    fn resolve_pause<'a>(
        &'a self,
        request: &'a DrainRequest,
        resolution: Resolution,
    ) -> CallFuture<'a, ()>;
}
