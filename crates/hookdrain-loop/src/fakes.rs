//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use hookdrain_core::{
    CallFuture, DrainRequest, LifecycleController, MetricQuery, MetricSource, Resolution,
};

/// Metric source that replays a script of answers, then repeats a
/// fallback once the script runs out.
pub(crate) struct ScriptedMetrics {
    script: Mutex<VecDeque<Result<Option<f64>, String>>>,
    fallback: Result<Option<f64>, String>,
    queries: AtomicU32,
}

impl ScriptedMetrics {
    pub(crate) fn new(script: Vec<Result<Option<f64>, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Err("script exhausted".to_string()),
            queries: AtomicU32::new(0),
        }
    }

    pub(crate) fn repeating(answer: Result<Option<f64>, String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: answer,
            queries: AtomicU32::new(0),
        }
    }

    pub(crate) fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }
}

impl MetricSource for ScriptedMetrics {
    fn query<'a>(&'a self, _query: &'a MetricQuery) -> CallFuture<'a, Option<f64>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { answer })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Heartbeat,
    Resolve(Resolution),
}

/// Lifecycle controller that records every call in order.
pub(crate) struct RecordingController {
    calls: Mutex<Vec<Call>>,
    fail_heartbeats: bool,
    fail_resolves: bool,
}

impl RecordingController {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_heartbeats: false,
            fail_resolves: false,
        }
    }

    pub(crate) fn failing_heartbeats(mut self) -> Self {
        self.fail_heartbeats = true;
        self
    }

    pub(crate) fn failing_resolves(mut self) -> Self {
        self.fail_resolves = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn heartbeat_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Heartbeat)
            .count()
    }

    pub(crate) fn resolve_calls(&self) -> Vec<Resolution> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Resolve(r) => Some(r),
                Call::Heartbeat => None,
            })
            .collect()
    }
}

impl LifecycleController for RecordingController {
    fn extend_pause<'a>(&'a self, _request: &'a DrainRequest) -> CallFuture<'a, ()> {
        self.calls.lock().unwrap().push(Call::Heartbeat);
        let fail = self.fail_heartbeats;
        Box::pin(async move {
            if fail {
                Err("heartbeat rejected".to_string())
            } else {
                Ok(())
            }
        })
    }

    fn resolve_pause<'a>(
        &'a self,
        _request: &'a DrainRequest,
        resolution: Resolution,
    ) -> CallFuture<'a, ()> {
        self.calls.lock().unwrap().push(Call::Resolve(resolution));
        let fail = self.fail_resolves;
        Box::pin(async move {
            if fail {
                Err("lifecycle action not found".to_string())
            } else {
                Ok(())
            }
        })
    }
}
