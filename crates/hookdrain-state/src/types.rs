//! Persisted record types that are local to the store.
//!
//! Drain checkpoints reuse `hookdrain_core::AttemptState` directly; the
//! types here back the store's own metric source and lifecycle ledger.

use serde::{Deserialize, Serialize};

use hookdrain_core::{Dimension, DrainRequest, Resolution};

// ── Usage samples ─────────────────────────────────────────────────

/// One published data point of a usage metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageSample {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    /// Unix timestamp (seconds) the value was observed at.
    pub timestamp: u64,
    pub value: f64,
}

impl UsageSample {
    /// Series key shared by every sample of the same metric and dimensions.
    pub fn series_key(namespace: &str, metric_name: &str, dimensions: &[Dimension]) -> String {
        let mut dims: Vec<String> = dimensions
            .iter()
            .map(|d| format!("{}={}", d.name, d.value))
            .collect();
        dims.sort();
        format!("{namespace}/{metric_name}|{}", dims.join(","))
    }

    /// Build the composite key for the samples table.
    pub fn table_key(&self) -> String {
        format!(
            "{}|{:020}",
            Self::series_key(&self.namespace, &self.metric_name, &self.dimensions),
            self.timestamp
        )
    }
}

// ── Lifecycle pauses ──────────────────────────────────────────────

/// State of a lifecycle pause in the local ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseStatus {
    /// Termination is on hold awaiting a decision.
    Pending,
    /// Resolved with CONTINUE; the instance may terminate.
    Continued,
    /// Resolved with ABANDON; the instance stays.
    Abandoned,
}

impl From<Resolution> for PauseStatus {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Proceed => PauseStatus::Continued,
            Resolution::Abandon => PauseStatus::Abandoned,
        }
    }
}

/// A lifecycle pause as recorded by the local controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PauseRecord {
    pub request: DrainRequest,
    pub status: PauseStatus,
    /// Heartbeats recorded against this pause.
    pub heartbeats: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PauseRecord {
    pub fn new(request: DrainRequest, now: u64) -> Self {
        Self {
            request,
            status: PauseStatus::Pending,
            heartbeats: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the composite key for the pauses table.
    pub fn table_key(&self) -> String {
        self.request.table_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_key_ignores_dimension_order() {
        let a = UsageSample::series_key(
            "ns",
            "m",
            &[Dimension::new("InstanceId", "i-1"), Dimension::new("AutoScalingGroupName", "g")],
        );
        let b = UsageSample::series_key(
            "ns",
            "m",
            &[Dimension::new("AutoScalingGroupName", "g"), Dimension::new("InstanceId", "i-1")],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn sample_keys_sort_by_time() {
        let mut early = UsageSample {
            namespace: "ns".to_string(),
            metric_name: "m".to_string(),
            dimensions: vec![],
            timestamp: 9,
            value: 1.0,
        };
        let k1 = early.table_key();
        early.timestamp = 10;
        let k2 = early.table_key();
        assert!(k1 < k2);
    }
}
