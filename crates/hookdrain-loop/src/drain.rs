//! Drain decision loop: one lifecycle pause, polled until resolved.
//!
//! `DrainLoop::step` runs a single cycle against an `AttemptState`:
//! heartbeat (after the first attempt), peak-usage query, decision. It
//! never sleeps. `DrainLoop::run` strings cycles together in-process with
//! the configured delay between them; the scheduler instead persists the
//! state and re-enters `step` when the next cycle is due.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use hookdrain_core::{
    AttemptState, DrainError, DrainRequest, DrainSettings, LifecycleController, MetricQuery,
    MetricSource, Resolution, ResolutionReason, Statistic, StepOutcome, epoch_secs,
};

/// Source of "now" in unix seconds. Injected so re-entry can be tested
/// without waiting on the wall clock.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Final report of a drain that ran to resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub resolution: Resolution,
    pub reason: ResolutionReason,
    pub state: AttemptState,
}

/// The drain decision loop, wired to its collaborators.
pub struct DrainLoop {
    metrics: Arc<dyn MetricSource>,
    lifecycle: Arc<dyn LifecycleController>,
    settings: DrainSettings,
    clock: Clock,
}

impl DrainLoop {
    /// Create a loop over the given metric source and lifecycle controller.
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        lifecycle: Arc<dyn LifecycleController>,
        settings: DrainSettings,
    ) -> Self {
        Self {
            metrics,
            lifecycle,
            settings,
            clock: Arc::new(epoch_secs),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &DrainSettings {
        &self.settings
    }

    /// Current time according to the loop's clock.
    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Fresh attempt state for a request, due immediately.
    pub fn begin(&self, request: DrainRequest) -> AttemptState {
        AttemptState::new(request, self.settings.max_attempts, self.now())
    }

    /// Peak-usage query for the window ending at `now`.
    pub fn metric_query(&self, request: &DrainRequest, now: u64) -> MetricQuery {
        MetricQuery {
            namespace: self.settings.namespace.clone(),
            metric_name: self.settings.metric_name.clone(),
            dimensions: MetricQuery::dimensions_for(request),
            start: now.saturating_sub(self.settings.window.as_secs()),
            end: now,
            period_secs: self.settings.period.as_secs(),
            statistic: Statistic::Maximum,
        }
    }

    /// Run one poll cycle.
    ///
    /// Returns `Pending` when the pause should be checked again after the
    /// configured delay, or `Resolved` once a resolve call has been issued.
    /// A resolved state is returned as-is without touching either
    /// collaborator. The only error is a failed resolve call, after which
    /// the state is still marked resolved so the call is never reissued.
    pub async fn step(&self, state: &mut AttemptState) -> Result<StepOutcome, DrainError> {
        if let Some(reason) = state.outcome {
            debug!(request = %state.request, %reason, "drain already resolved");
            return Ok(StepOutcome::Resolved {
                resolution: reason.resolution(),
                reason,
            });
        }

        if state.is_exhausted() {
            info!(
                request = %state.request,
                max_attempts = state.max_attempts,
                "exceeded maximum attempts, abandoning termination"
            );
            return self.resolve(state, ResolutionReason::AttemptsExhausted).await;
        }

        // The pause's own timeout covers the first check.
        if state.attempt > 0 {
            match self.lifecycle.extend_pause(&state.request).await {
                Ok(()) => {
                    state.heartbeats += 1;
                    info!(
                        request = %state.request,
                        attempt = state.attempt + 1,
                        "recorded heartbeat"
                    );
                }
                Err(e) => {
                    let err = DrainError::Heartbeat(e);
                    warn!(
                        request = %state.request,
                        attempt = state.attempt + 1,
                        error = %err,
                        "failed to record heartbeat"
                    );
                }
            }
        }

        let query = self.metric_query(&state.request, self.now());
        let value = match self.metrics.query(&query).await {
            Ok(value) => value,
            Err(e) => {
                let err = DrainError::MetricQuery(e);
                error!(
                    request = %state.request,
                    attempt = state.attempt + 1,
                    error = %err,
                    "abandoning termination on error"
                );
                return self.resolve(state, ResolutionReason::MetricQueryFailed).await;
            }
        };
        state.last_value = value;

        match value {
            // Negative and NaN readings are never taken as idle.
            Some(v) if v == 0.0 => {
                info!(
                    request = %state.request,
                    metric = %self.settings.metric_name,
                    value = v,
                    "no active usage, instance can be terminated"
                );
                return self.resolve(state, ResolutionReason::NoActiveUsage).await;
            }
            Some(v) => {
                info!(
                    request = %state.request,
                    metric = %self.settings.metric_name,
                    value = v,
                    "instance has active usage, waiting"
                );
            }
            None => {
                info!(
                    request = %state.request,
                    metric = %self.settings.metric_name,
                    "no metric data available, waiting for next check"
                );
            }
        }

        // Anchored to admission so a late re-entry does not push the
        // rest of the schedule back.
        state.attempt += 1;
        state.next_check_at = state.created_at.saturating_add(
            self.settings
                .delay
                .as_secs()
                .saturating_mul(u64::from(state.attempt)),
        );
        state.updated_at = self.now();

        Ok(StepOutcome::Pending {
            attempt: state.attempt,
            next_check_at: state.next_check_at,
        })
    }

    /// Issue the single resolve call for this drain.
    async fn resolve(
        &self,
        state: &mut AttemptState,
        reason: ResolutionReason,
    ) -> Result<StepOutcome, DrainError> {
        let resolution = reason.resolution();
        // Marked before the call: whatever the controller answers, this
        // drain never issues a second resolve.
        state.outcome = Some(reason);
        state.updated_at = self.now();

        match self.lifecycle.resolve_pause(&state.request, resolution).await {
            Ok(()) => {
                info!(
                    request = %state.request,
                    %resolution,
                    %reason,
                    attempts = state.attempt,
                    "lifecycle pause resolved"
                );
                Ok(StepOutcome::Resolved { resolution, reason })
            }
            Err(message) => {
                let err = DrainError::Resolve {
                    resolution,
                    reason,
                    message,
                };
                error!(request = %state.request, error = %err, "failed to resolve lifecycle pause");
                Err(err)
            }
        }
    }

    /// Drive a request to resolution in-process, sleeping `delay` between
    /// cycles. Bounded by `max_attempts × delay`.
    pub async fn run(&self, request: DrainRequest) -> Result<DrainReport, DrainError> {
        let mut state = self.begin(request);
        info!(
            request = %state.request,
            max_attempts = self.settings.max_attempts,
            delay_secs = self.settings.delay.as_secs(),
            budget_secs = self.settings.budget().as_secs(),
            "drain started"
        );

        loop {
            match self.step(&mut state).await? {
                StepOutcome::Pending { attempt, .. } => {
                    debug!(request = %state.request, next_attempt = attempt, "sleeping until next check");
                    tokio::time::sleep(self.settings.delay).await;
                }
                StepOutcome::Resolved { resolution, reason } => {
                    return Ok(DrainReport {
                        resolution,
                        reason,
                        state,
                    });
                }
            }
        }
    }
}
