//! Lifecycle event intake.
//!
//! Accepts either the event-bus envelope emitted when a lifecycle hook
//! pauses a termination:
//!
//! ```json
//! { "detail": { "EC2InstanceId": "i-0abc", "AutoScalingGroupName": "workers",
//!               "LifecycleHookName": "drain-hook" } }
//! ```
//!
//! or a flat `{ "resourceId", "groupId", "hookId" }` object. Anything that
//! does not name all three identifiers is a `MalformedRequest`.

use serde::Deserialize;
use tracing::debug;

use crate::error::DrainError;
use crate::types::DrainRequest;

#[derive(Debug, Deserialize)]
struct Envelope {
    detail: Option<Detail>,
    #[serde(rename = "resourceId")]
    resource_id: Option<String>,
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "hookId")]
    hook_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Detail {
    #[serde(rename = "EC2InstanceId")]
    instance_id: Option<String>,
    #[serde(rename = "AutoScalingGroupName")]
    group_name: Option<String>,
    #[serde(rename = "LifecycleHookName")]
    hook_name: Option<String>,
    #[serde(rename = "LifecycleTransition")]
    transition: Option<String>,
    #[serde(rename = "LifecycleActionToken")]
    action_token: Option<String>,
}

/// A parsed termination-pause event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub request: DrainRequest,
    /// e.g. `autoscaling:EC2_INSTANCE_TERMINATING`, when present.
    pub transition: Option<String>,
    pub action_token: Option<String>,
}

impl LifecycleEvent {
    /// Parse an event from its JSON text.
    pub fn from_json(raw: &str) -> Result<Self, DrainError> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| DrainError::MalformedRequest(format!("invalid event: {e}")))?;

        let event = match envelope.detail {
            Some(detail) => {
                let instance = field("detail.EC2InstanceId", detail.instance_id)?;
                let group = field("detail.AutoScalingGroupName", detail.group_name)?;
                let hook = field("detail.LifecycleHookName", detail.hook_name)?;
                LifecycleEvent {
                    request: DrainRequest::new(&instance, &group, &hook)?,
                    transition: detail.transition,
                    action_token: detail.action_token,
                }
            }
            None => {
                let instance = field("resourceId", envelope.resource_id)?;
                let group = field("groupId", envelope.group_id)?;
                let hook = field("hookId", envelope.hook_id)?;
                LifecycleEvent {
                    request: DrainRequest::new(&instance, &group, &hook)?,
                    transition: None,
                    action_token: None,
                }
            }
        };

        debug!(request = %event.request, transition = ?event.transition, "lifecycle event parsed");
        Ok(event)
    }
}

fn field(name: &str, value: Option<String>) -> Result<String, DrainError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DrainError::MalformedRequest(format!("missing {name}"))),
    }
}
