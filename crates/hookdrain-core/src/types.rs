//! Domain types for the drain decision loop.
//!
//! A `DrainRequest` names the lifecycle pause being acted on, an
//! `AttemptState` carries the loop's progress between cycles (in memory
//! or persisted for scheduled re-entry), and a `Resolution` is the
//! terminal outcome sent back to the lifecycle controller.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::DrainError;

// ── Request ───────────────────────────────────────────────────────

/// Identity of one paused termination: the instance, its owning
/// autoscaling group, and the lifecycle hook holding the pause.
///
/// Validated on construction; every field is a non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDrainRequest")]
pub struct DrainRequest {
    instance_id: String,
    group_name: String,
    hook_name: String,
}

#[derive(Deserialize)]
struct RawDrainRequest {
    instance_id: String,
    group_name: String,
    hook_name: String,
}

impl TryFrom<RawDrainRequest> for DrainRequest {
    type Error = DrainError;

    fn try_from(raw: RawDrainRequest) -> Result<Self, Self::Error> {
        DrainRequest::new(&raw.instance_id, &raw.group_name, &raw.hook_name)
    }
}

impl DrainRequest {
    /// Build a request, rejecting empty or whitespace-only identifiers.
    pub fn new(instance_id: &str, group_name: &str, hook_name: &str) -> Result<Self, DrainError> {
        Ok(Self {
            instance_id: required("instance_id", instance_id)?,
            group_name: required("group_name", group_name)?,
            hook_name: required("hook_name", hook_name)?,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn hook_name(&self) -> &str {
        &self.hook_name
    }

    /// Composite key `{group}/{instance}/{hook}` used by the state store.
    pub fn table_key(&self) -> String {
        format!("{}/{}/{}", self.group_name, self.instance_id, self.hook_name)
    }
}

impl fmt::Display for DrainRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table_key())
    }
}

fn required(field: &str, value: &str) -> Result<String, DrainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DrainError::MalformedRequest(format!("missing {field}")));
    }
    Ok(trimmed.to_string())
}

// ── Resolution ────────────────────────────────────────────────────

/// Terminal outcome of a lifecycle pause.
///
/// Serialized with the lifecycle-action result names the autoscaling
/// group understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Let the termination go ahead.
    #[serde(rename = "CONTINUE")]
    Proceed,
    /// Cancel the termination; the instance stays in service.
    #[serde(rename = "ABANDON")]
    Abandon,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Proceed => "CONTINUE",
            Resolution::Abandon => "ABANDON",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a drain resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    /// The usage metric reported exactly zero.
    NoActiveUsage,
    /// The attempt budget ran out before usage reached zero.
    AttemptsExhausted,
    /// The metric source failed; an unknown load is never treated as idle.
    MetricQueryFailed,
}

impl ResolutionReason {
    /// The resolution each reason implies.
    pub fn resolution(&self) -> Resolution {
        match self {
            ResolutionReason::NoActiveUsage => Resolution::Proceed,
            ResolutionReason::AttemptsExhausted | ResolutionReason::MetricQueryFailed => {
                Resolution::Abandon
            }
        }
    }
}

impl fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionReason::NoActiveUsage => "no_active_usage",
            ResolutionReason::AttemptsExhausted => "attempts_exhausted",
            ResolutionReason::MetricQueryFailed => "metric_query_failed",
        };
        f.write_str(s)
    }
}

// ── Attempt state ─────────────────────────────────────────────────

/// Progress of one drain, owned by exactly one loop at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptState {
    pub request: DrainRequest,
    /// Completed poll cycles. Starts at 0.
    pub attempt: u32,
    /// Attempt budget; reaching it resolves ABANDON.
    pub max_attempts: u32,
    /// Last metric value read, `None` when the last read had no data.
    pub last_value: Option<f64>,
    /// Heartbeats successfully recorded so far.
    pub heartbeats: u32,
    /// Set exactly once, when the resolve call is issued. The reason
    /// determines the resolution.
    pub outcome: Option<ResolutionReason>,
    /// Unix timestamp before which the next cycle must not run.
    pub next_check_at: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl AttemptState {
    /// Fresh state for a request; attempt 0 is due immediately.
    pub fn new(request: DrainRequest, max_attempts: u32, now: u64) -> Self {
        Self {
            request,
            attempt: 0,
            max_attempts,
            last_value: None,
            heartbeats: 0,
            outcome: None,
            next_check_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// The resolution issued for this drain, if any.
    pub fn resolution(&self) -> Option<Resolution> {
        self.outcome.map(|reason| reason.resolution())
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Whether the scheduler may run the next cycle at `now`.
    pub fn is_due(&self, now: u64) -> bool {
        !self.is_resolved() && self.next_check_at <= now
    }

    /// Key of the checkpoint in the state store.
    pub fn table_key(&self) -> String {
        self.request.table_key()
    }
}

/// Result of running a single cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// No resolution yet; the next cycle is `attempt`, due at `next_check_at`.
    Pending { attempt: u32, next_check_at: u64 },
    /// The pause has been resolved. Terminal.
    Resolved {
        resolution: Resolution,
        reason: ResolutionReason,
    },
}

// ── Metric query ──────────────────────────────────────────────────

/// Aggregation applied over the query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Maximum,
}

/// A single name/value dimension scoping a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// "What was the peak of `metric_name` for these dimensions between
/// `start` and `end`?"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    /// Window start, unix seconds (inclusive).
    pub start: u64,
    /// Window end, unix seconds (inclusive).
    pub end: u64,
    /// Aggregation period in seconds.
    pub period_secs: u64,
    pub statistic: Statistic,
}

/// Dimension names identifying an instance within its group.
pub const INSTANCE_DIMENSION: &str = "InstanceId";
pub const GROUP_DIMENSION: &str = "AutoScalingGroupName";

impl MetricQuery {
    /// Dimensions scoping the usage metric to the request's instance and group.
    pub fn dimensions_for(request: &DrainRequest) -> Vec<Dimension> {
        vec![
            Dimension::new(INSTANCE_DIMENSION, request.instance_id()),
            Dimension::new(GROUP_DIMENSION, request.group_name()),
        ]
    }
}

// ── Completion ────────────────────────────────────────────────────

/// Completion signal returned to whoever invoked the drain.
///
/// The resolution itself is informational; the status is always 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl Completion {
    pub fn for_resolution(resolution: Resolution) -> Self {
        let body = match resolution {
            Resolution::Proceed => "Instance can be terminated",
            Resolution::Abandon => "Function completed successfully",
        };
        Self {
            status_code: 200,
            body: body.to_string(),
        }
    }
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
