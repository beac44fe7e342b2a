//! StateStore: redb-backed persistence for hookdrain.
//!
//! Holds drain checkpoints for scheduled re-entry, the usage samples
//! served by the local metric source, and the local lifecycle pause
//! ledger. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use hookdrain_core::{AttemptState, Dimension, DrainRequest, Resolution};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
        txn.open_table(PAUSES).map_err(map_err!(Table))?;
        txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put<T: Serialize>(
        &self,
        table_def: JsonTable,
        key: &str,
        record: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table_def: JsonTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(
        &self,
        table_def: JsonTable,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Records with keys in `[start, end]`, in key order.
    fn range<T: DeserializeOwned>(
        &self,
        table_def: JsonTable,
        start: &str,
        end: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results: Vec<T> = Vec::new();
        for entry in table.range(start..=end).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    /// Remove the given keys in one write transaction. Returns number removed.
    fn remove_keys(&self, table_def: JsonTable, keys: &[String]) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            for key in keys {
                if table.remove(key.as_str()).map_err(map_err!(Write))?.is_some() {
                    count += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(count)
    }

    /// Read-modify-write a single record inside one write transaction.
    fn update<T, F>(
        &self,
        table_def: JsonTable,
        key: &str,
        f: F,
    ) -> StateResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> StateResult<T>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            let existing: Option<T> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            updated = f(existing)?;
            let value = serde_json::to_vec(&updated).map_err(map_err!(Serialize))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    // ── Checkpoints ────────────────────────────────────────────────

    /// Insert or update a drain checkpoint.
    pub fn put_checkpoint(&self, state: &AttemptState) -> StateResult<()> {
        let key = state.table_key();
        self.put(CHECKPOINTS, &key, state)?;
        debug!(%key, attempt = state.attempt, resolved = state.is_resolved(), "checkpoint stored");
        Ok(())
    }

    /// Register a new drain checkpoint.
    ///
    /// Fails with `Conflict` if an unresolved checkpoint already exists for
    /// the same pause; a resolved one is replaced.
    pub fn admit_checkpoint(&self, state: &AttemptState) -> StateResult<()> {
        let key = state.table_key();
        self.update(CHECKPOINTS, &key, |existing: Option<AttemptState>| match existing {
            Some(current) if !current.is_resolved() => Err(StateError::Conflict(format!(
                "drain {key} is already in progress at attempt {}",
                current.attempt
            ))),
            _ => Ok(state.clone()),
        })?;
        debug!(%key, "checkpoint admitted");
        Ok(())
    }

    /// Get a checkpoint by its `{group}/{instance}/{hook}` key.
    pub fn get_checkpoint(&self, key: &str) -> StateResult<Option<AttemptState>> {
        self.get(CHECKPOINTS, key)
    }

    /// List all checkpoints.
    pub fn list_checkpoints(&self) -> StateResult<Vec<AttemptState>> {
        self.list(CHECKPOINTS, "")
    }

    /// List unresolved checkpoints whose next cycle is due at `now`.
    pub fn list_due_checkpoints(&self, now: u64) -> StateResult<Vec<AttemptState>> {
        Ok(self
            .list_checkpoints()?
            .into_iter()
            .filter(|state| state.is_due(now))
            .collect())
    }

    /// Delete resolved checkpoints last updated before `cutoff`. Returns
    /// number deleted.
    pub fn prune_resolved_checkpoints(&self, cutoff: u64) -> StateResult<u32> {
        let keys: Vec<String> = self
            .list_checkpoints()?
            .into_iter()
            .filter(|state| state.is_resolved() && state.updated_at < cutoff)
            .map(|state| state.table_key())
            .collect();
        self.remove_keys(CHECKPOINTS, &keys)
    }

    // ── Usage samples ──────────────────────────────────────────────

    /// Store a usage sample. Non-finite values are rejected: they have no
    /// JSON form and would leave the series unreadable.
    pub fn put_sample(&self, sample: &UsageSample) -> StateResult<()> {
        if !sample.value.is_finite() {
            return Err(StateError::Invalid(format!(
                "usage sample value must be finite, got {}",
                sample.value
            )));
        }
        self.put(SAMPLES, &sample.table_key(), sample)
    }

    /// Peak sample value for a series within `[start, end]`, or `None`
    /// when no sample falls in the window.
    pub fn max_sample(
        &self,
        namespace: &str,
        metric_name: &str,
        dimensions: &[Dimension],
        start: u64,
        end: u64,
    ) -> StateResult<Option<f64>> {
        let series = UsageSample::series_key(namespace, metric_name, dimensions);
        let peak = self
            .range::<UsageSample>(
                SAMPLES,
                &format!("{series}|{start:020}"),
                &format!("{series}|{end:020}"),
            )?
            .into_iter()
            .map(|s| s.value)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        Ok(peak)
    }

    /// Delete samples of every series taken before `before`. Returns number
    /// deleted.
    pub fn prune_samples(&self, before: u64) -> StateResult<u32> {
        let mut stale = Vec::new();
        {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                let timestamp = key
                    .value()
                    .rsplit_once('|')
                    .and_then(|(_, ts)| ts.parse::<u64>().ok());
                if timestamp.is_some_and(|ts| ts < before) {
                    stale.push(key.value().to_string());
                }
            }
        }
        self.remove_keys(SAMPLES, &stale)
    }

    // ── Lifecycle pauses ───────────────────────────────────────────

    /// Open a pending pause for a request, replacing any earlier record.
    pub fn begin_pause(&self, request: &DrainRequest, now: u64) -> StateResult<PauseRecord> {
        let record = PauseRecord::new(request.clone(), now);
        self.put(PAUSES, &record.table_key(), &record)?;
        debug!(key = %record.table_key(), "pause opened");
        Ok(record)
    }

    /// Get a pause by its `{group}/{instance}/{hook}` key.
    pub fn get_pause(&self, key: &str) -> StateResult<Option<PauseRecord>> {
        self.get(PAUSES, key)
    }

    /// List all pauses.
    pub fn list_pauses(&self) -> StateResult<Vec<PauseRecord>> {
        self.list(PAUSES, "")
    }

    /// Record a heartbeat against a pending pause.
    pub fn heartbeat_pause(&self, request: &DrainRequest, now: u64) -> StateResult<PauseRecord> {
        let key = request.table_key();
        self.update(PAUSES, &key, |existing: Option<PauseRecord>| {
            let mut record = pending_pause(&key, existing)?;
            record.heartbeats += 1;
            record.updated_at = now;
            Ok(record)
        })
    }

    /// Resolve a pending pause. Resolving an already-resolved pause fails.
    pub fn resolve_pause(
        &self,
        request: &DrainRequest,
        resolution: Resolution,
        now: u64,
    ) -> StateResult<PauseRecord> {
        let key = request.table_key();
        let record = self.update(PAUSES, &key, |existing: Option<PauseRecord>| {
            let mut record = pending_pause(&key, existing)?;
            record.status = PauseStatus::from(resolution);
            record.updated_at = now;
            Ok(record)
        })?;
        debug!(%key, %resolution, "pause resolved");
        Ok(record)
    }

    /// Delete resolved pauses last updated before `cutoff`. Returns number
    /// deleted.
    pub fn prune_resolved_pauses(&self, cutoff: u64) -> StateResult<u32> {
        let keys: Vec<String> = self
            .list_pauses()?
            .into_iter()
            .filter(|record| record.status != PauseStatus::Pending && record.updated_at < cutoff)
            .map(|record| record.table_key())
            .collect();
        self.remove_keys(PAUSES, &keys)
    }
}

fn pending_pause(key: &str, existing: Option<PauseRecord>) -> StateResult<PauseRecord> {
    match existing {
        None => Err(StateError::NotFound(format!("no lifecycle pause for {key}"))),
        Some(record) if record.status != PauseStatus::Pending => Err(StateError::Conflict(
            format!("lifecycle pause {key} is already {:?}", record.status),
        )),
        Some(record) => Ok(record),
    }
}
