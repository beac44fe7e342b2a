//! Drain scheduler: re-enters the decision loop from persisted state.
//!
//! Instead of one long-lived task sleeping between cycles, every drain is
//! a checkpoint in the state store. Each tick steps the drains whose next
//! check is due and writes the updated checkpoint back, so a drain
//! survives restarts and no invocation ever blocks for the full budget.
//! Ticks are serialized, which keeps cycles for the same pause from
//! overlapping.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use hookdrain_core::{AttemptState, DrainError, DrainRequest, LifecycleEvent, StepOutcome};
use hookdrain_state::{StateError, StateStore};

use crate::drain::DrainLoop;

/// Schedules drain cycles against the state store.
pub struct DrainScheduler {
    store: StateStore,
    drain: Arc<DrainLoop>,
    /// Optional drop directory of lifecycle event files.
    inbox: Option<PathBuf>,
    /// Serializes ticks and admissions.
    tick_lock: Mutex<()>,
}

impl DrainScheduler {
    /// Create a new scheduler.
    pub fn new(store: StateStore, drain: Arc<DrainLoop>) -> Self {
        Self {
            store,
            drain,
            inbox: None,
            tick_lock: Mutex::new(()),
        }
    }

    /// Admit event files dropped into `dir` at the start of every tick.
    pub fn with_inbox(mut self, dir: PathBuf) -> Self {
        self.inbox = Some(dir);
        self
    }

    /// Register a new drain and run its first cycle immediately.
    ///
    /// Rejected with `InProgress` if the same pause already has an
    /// unresolved checkpoint.
    pub async fn admit(&self, request: DrainRequest) -> Result<AttemptState, DrainError> {
        let _guard = self.tick_lock.lock().await;
        self.admit_locked(request).await
    }

    async fn admit_locked(&self, request: DrainRequest) -> Result<AttemptState, DrainError> {
        let mut state = self.drain.begin(request);
        self.store.admit_checkpoint(&state).map_err(|e| match e {
            StateError::Conflict(msg) => DrainError::InProgress(msg),
            other => checkpoint_error(other),
        })?;
        info!(request = %state.request, "drain admitted");

        let result = self.drain.step(&mut state).await;
        persist(&state, |state| self.store.put_checkpoint(state))?;
        result?;
        Ok(state)
    }

    /// Step every drain whose next check is due.
    ///
    /// Returns the outcome per drain key. A failed resolve is logged and
    /// reported with the outcome recorded on the checkpoint; only store
    /// failures abort the tick.
    pub async fn tick(&self) -> Result<Vec<(String, StepOutcome)>, DrainError> {
        let _guard = self.tick_lock.lock().await;

        if let Some(dir) = &self.inbox {
            let admitted = self.ingest_inbox(dir).await;
            if admitted > 0 {
                info!(admitted, "inbox events admitted");
            }
        }

        let now = self.drain.now();
        let due = self
            .store
            .list_due_checkpoints(now)
            .map_err(checkpoint_error)?;
        debug!(due = due.len(), "scheduler tick");

        let mut stepped = Vec::with_capacity(due.len());
        for mut state in due {
            let key = state.table_key();
            let result = self.drain.step(&mut state).await;
            persist(&state, |state| self.store.put_checkpoint(state))?;

            match result {
                Ok(outcome) => stepped.push((key, outcome)),
                Err(e) => {
                    error!(drain = %key, error = %e, "drain cycle failed");
                    if let Some(reason) = state.outcome {
                        stepped.push((
                            key,
                            StepOutcome::Resolved {
                                resolution: reason.resolution(),
                                reason,
                            },
                        ));
                    }
                }
            }
        }

        Ok(stepped)
    }

    /// Delete resolved checkpoints and pauses older than `retain`, and usage
    /// samples older than `retain` or the lookback window, whichever is
    /// longer. Returns the total number of records deleted.
    pub fn prune(&self, retain: Duration) -> Result<u32, DrainError> {
        let now = self.drain.now();
        let cutoff = now.saturating_sub(retain.as_secs());
        let sample_cutoff =
            now.saturating_sub(retain.max(self.drain.settings().window).as_secs());

        let checkpoints = self
            .store
            .prune_resolved_checkpoints(cutoff)
            .map_err(checkpoint_error)?;
        let pauses = self
            .store
            .prune_resolved_pauses(cutoff)
            .map_err(checkpoint_error)?;
        let samples = self
            .store
            .prune_samples(sample_cutoff)
            .map_err(checkpoint_error)?;

        let pruned = checkpoints + pauses + samples;
        if pruned > 0 {
            debug!(checkpoints, pauses, samples, "state pruned");
        }
        Ok(pruned)
    }

    /// Admit every `*.json` event file in the inbox.
    ///
    /// Admitted and duplicate events are removed; malformed ones are
    /// renamed to `*.rejected`. Files hit by a store failure stay for the
    /// next tick.
    async fn ingest_inbox(&self, dir: &Path) -> u32 {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(inbox = ?dir, error = %e, "failed to read inbox");
                return 0;
            }
        };

        let mut admitted = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(inbox = ?dir, error = %e, "failed to list inbox");
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(file = ?path, error = %e, "failed to read event file");
                    continue;
                }
            };
            info!(file = ?path, event = %raw, "received lifecycle event");

            let outcome = match LifecycleEvent::from_json(&raw) {
                Ok(event) => self.admit_locked(event.request).await,
                Err(e) => Err(e),
            };

            let disposition = match outcome {
                Ok(_) => {
                    admitted += 1;
                    tokio::fs::remove_file(&path).await
                }
                Err(e @ DrainError::MalformedRequest(_)) => {
                    error!(file = ?path, error = %e, "rejecting lifecycle event");
                    tokio::fs::rename(&path, path.with_extension("rejected")).await
                }
                Err(e @ DrainError::Checkpoint(_)) => {
                    error!(file = ?path, error = %e, "event left in inbox for retry");
                    Ok(())
                }
                Err(e) => {
                    warn!(file = ?path, error = %e, "event consumed, drain not started cleanly");
                    tokio::fs::remove_file(&path).await
                }
            };
            if let Err(e) = disposition {
                warn!(file = ?path, error = %e, "failed to clear event file");
            }
        }

        admitted
    }

    /// Run the scheduler loop until shutdown.
    pub async fn run(
        &self,
        interval: Duration,
        retain: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "drain scheduler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "scheduler tick failed");
                    }
                    if let Err(e) = self.prune(retain) {
                        error!(error = %e, "checkpoint pruning failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("drain scheduler shutting down");
                    break;
                }
            }
        }
    }
}

/// Write attempts for a checkpoint that already carries its outcome.
const RESOLVED_PERSIST_ATTEMPTS: u32 = 3;

/// Store a checkpoint after a cycle. A resolved checkpoint is retried:
/// losing it would let the next tick step the drain and resolve again.
fn persist<F>(state: &AttemptState, mut put: F) -> Result<(), DrainError>
where
    F: FnMut(&AttemptState) -> Result<(), StateError>,
{
    let attempts = if state.is_resolved() {
        RESOLVED_PERSIST_ATTEMPTS
    } else {
        1
    };
    let mut tried = 0;
    loop {
        tried += 1;
        match put(state) {
            Ok(()) => return Ok(()),
            Err(e) if tried < attempts => {
                warn!(drain = %state.table_key(), attempt = tried, error = %e, "retrying checkpoint write");
            }
            Err(e) => {
                if let Some(reason) = state.outcome {
                    error!(
                        drain = %state.table_key(),
                        resolution = %reason.resolution(),
                        %reason,
                        error = %e,
                        "resolved drain not checkpointed, it may be stepped again"
                    );
                }
                return Err(checkpoint_error(e));
            }
        }
    }
}

fn checkpoint_error(e: StateError) -> DrainError {
    DrainError::Checkpoint(e.to_string())
}
