//! Job store: the single source of truth for mix job status.
//!
//! Records are kept in submission order. Every change is published on the
//! [`EventBus`] and, when a state file is configured, written to disk.
//!
//! A state file has one owner at a time: the store opened with
//! [`JobStore::open`] holds `<state>.lock` until it is dropped. Other
//! processes can still read the history through [`JobStore::open_read_only`].

mod types;

pub use types::*;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tm_core::config::QueueConfig;
use tm_core::events::{EventBus, EventPayload};
use tm_core::{JobId, JobIdGenerator};

/// Message given to jobs that were queued or running when the process died.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

/// Failure to change a record's status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl From<StoreError> for tm_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => tm_core::Error::not_found("job", id),
            StoreError::Transition(e) => tm_core::Error::Validation(e.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    last_id: Option<JobId>,
    records: Vec<MixJobRecord>,
}

pub struct JobStore {
    /// Keyed by id; ids are assigned under the write lock so key order is
    /// submission order.
    records: RwLock<BTreeMap<JobId, MixJobRecord>>,
    ids: JobIdGenerator,
    history_limit: usize,
    persistence_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
    owner: Option<StateLock>,
    events: Arc<EventBus>,
}

impl JobStore {
    /// In-memory store.
    pub fn new(history_limit: usize, events: Arc<EventBus>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            ids: JobIdGenerator::new(),
            history_limit: history_limit.max(1),
            persistence_path: None,
            persist_lock: Mutex::new(()),
            owner: None,
            events,
        }
    }

    /// Store backed by a JSON file, owned by this process.
    ///
    /// Fails if another live store owns the file. Existing history is
    /// loaded; jobs that were queued or running when it was written are
    /// marked failed. New ids continue after the highest id seen in the file.
    pub fn open(path: impl Into<PathBuf>, history_limit: usize, events: Arc<EventBus>) -> Result<Self> {
        let path = path.into();
        let owner = StateLock::acquire(&path)?;
        let (last_id, mut records) = load_records(&path)?;

        let mut recovered = 0usize;
        for record in records.values_mut() {
            if !record.status.is_terminal() {
                record.status = JobStatus::Failed;
                record.message = Some(INTERRUPTED_MESSAGE.to_string());
                record.finished_at = Some(Utc::now());
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::info!(count = recovered, "marked interrupted jobs as failed");
        }

        let ids = match last_id {
            Some(last) => JobIdGenerator::starting_after(last)
                .with_context(|| format!("Job history {:?} has run out of job ids after #{}", path, last))?,
            None => JobIdGenerator::new(),
        };

        let store = Self {
            records: RwLock::new(records),
            ids,
            history_limit: history_limit.max(1),
            persistence_path: Some(path),
            persist_lock: Mutex::new(()),
            owner: Some(owner),
            events,
        };
        store.enforce_retention();
        store.persist();
        Ok(store)
    }

    /// Snapshot of a state file as written, for inspection.
    ///
    /// Takes no lock, recovers nothing and never writes the file back, so it
    /// is safe while another process owns the history.
    pub fn open_read_only(path: impl AsRef<Path>, history_limit: usize, events: Arc<EventBus>) -> Result<Self> {
        let (last_id, records) = load_records(path.as_ref())?;
        Ok(Self {
            records: RwLock::new(records),
            ids: last_id
                .and_then(JobIdGenerator::starting_after)
                .unwrap_or_default(),
            history_limit: history_limit.max(1),
            persistence_path: None,
            persist_lock: Mutex::new(()),
            owner: None,
            events,
        })
    }

    /// Build the store described by the queue configuration.
    pub fn from_config(config: &QueueConfig, events: Arc<EventBus>) -> Result<Self> {
        match &config.state_path {
            Some(path) => Self::open(path, config.history_limit, events),
            None => Ok(Self::new(config.history_limit, events)),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Allocate an id and append a queued record for it.
    pub fn create(&self, output_path: PathBuf, inputs: Vec<MixInput>) -> MixJobRecord {
        let record = {
            let mut records = self.records.write();
            let id = self.ids.next_id();
            let record = MixJobRecord::new(MixJob {
                id,
                created_at: Utc::now(),
                output_path,
                inputs,
            });
            records.insert(id, record.clone());
            record
        };

        tracing::debug!(job_id = %record.id(), "job queued");
        self.events.broadcast(EventPayload::JobQueued {
            job_id: record.id(),
            output_path: record.job.output_path.clone(),
        });
        self.persist();
        record
    }

    pub fn get(&self, id: JobId) -> tm_core::Result<MixJobRecord> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| tm_core::Error::not_found("job", id))
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<MixJobRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn list_newest_first(&self) -> Vec<MixJobRecord> {
        self.records.read().values().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for record in self.records.read().values() {
            counts.add(record.status);
        }
        counts
    }

    /// Claim a queued job for execution.
    pub fn mark_running(&self, id: JobId) -> Result<MixJobRecord, StoreError> {
        let record = self.update(id, MixJobRecord::start)?;
        self.events.broadcast(EventPayload::JobStarted { job_id: id });
        Ok(record)
    }

    pub fn mark_success(&self, id: JobId, message: impl Into<String>) -> Result<MixJobRecord, StoreError> {
        let message = message.into();
        let record = self.update(id, |r| r.succeed(message.clone()))?;
        self.events
            .broadcast(EventPayload::JobSucceeded { job_id: id, message });
        self.enforce_retention();
        Ok(record)
    }

    pub fn mark_failed(&self, id: JobId, error: impl Into<String>) -> Result<MixJobRecord, StoreError> {
        let error = error.into();
        let record = self.update(id, |r| r.fail(error.clone()))?;
        self.events
            .broadcast(EventPayload::JobFailed { job_id: id, error });
        self.enforce_retention();
        Ok(record)
    }

    pub fn mark_cancelled(&self, id: JobId) -> Result<MixJobRecord, StoreError> {
        let record = self.update(id, MixJobRecord::cancel)?;
        self.events.broadcast(EventPayload::JobCancelled { job_id: id });
        self.enforce_retention();
        Ok(record)
    }

    fn update(
        &self,
        id: JobId,
        apply: impl FnOnce(&mut MixJobRecord) -> Result<(), TransitionError>,
    ) -> Result<MixJobRecord, StoreError> {
        let record = {
            let mut records = self.records.write();
            let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            apply(record)?;
            record.clone()
        };
        tracing::debug!(job_id = %id, status = %record.status, "job status changed");
        self.persist();
        Ok(record)
    }

    /// Drop the oldest terminal records beyond the history limit.
    fn enforce_retention(&self) {
        let evicted = {
            let mut records = self.records.write();
            let terminal: Vec<JobId> = records
                .values()
                .filter(|r| r.status.is_terminal())
                .map(MixJobRecord::id)
                .collect();
            let excess = terminal.len().saturating_sub(self.history_limit);
            for id in &terminal[..excess] {
                records.remove(id);
            }
            excess
        };

        if evicted > 0 {
            tracing::debug!(count = evicted, "evicted old job records");
            self.persist();
        }
    }

    fn persist(&self) {
        if let Some(ref path) = self.persistence_path {
            let _guard = self.persist_lock.lock();
            if let Err(e) = self.save_to_file(path) {
                tracing::error!("Failed to persist job history: {:#}", e);
            }
        }
    }

    fn save_to_file(&self, path: &Path) -> Result<()> {
        let state = {
            let records = self.records.read();
            PersistedState {
                last_id: records.keys().next_back().copied(),
                records: records.values().cloned().collect(),
            }
        };
        let json = serde_json::to_string_pretty(&state)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory: {:?}", dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        std::io::Write::write_all(&mut tmp, json.as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("Failed to replace state file: {:?}", path))?;
        Ok(())
    }
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("records", &self.len())
            .field("history_limit", &self.history_limit)
            .field("persistence_path", &self.persistence_path)
            .field("owner", &self.owner.is_some())
            .finish()
    }
}

/// Exclusive claim on a state file, held as `<state>.lock` containing the
/// owner's pid. Removed on drop.
#[derive(Debug)]
struct StateLock {
    path: PathBuf,
}

impl StateLock {
    fn path_for(state: &Path) -> PathBuf {
        let mut name = OsString::from(state.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    fn acquire(state: &Path) -> Result<Self> {
        let path = Self::path_for(state);
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {:?}", dir))?;
        }

        match Self::create(&path) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            other => {
                return other
                    .map(|()| Self { path: path.clone() })
                    .with_context(|| format!("Failed to create lock file: {:?}", path));
            }
        }

        let holder = std::fs::read_to_string(&path).unwrap_or_default();
        let holder = holder.trim();
        if !owner_is_gone(holder) {
            anyhow::bail!(
                "Job history {:?} is in use by another trackmix process (pid {}); remove {:?} if that process is gone",
                state,
                if holder.is_empty() { "unknown" } else { holder },
                path
            );
        }

        tracing::warn!(pid = holder, lock = ?path, "removing stale job history lock");
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove stale lock file: {:?}", path))?;
        Self::create(&path).with_context(|| format!("Failed to create lock file: {:?}", path))?;
        Ok(Self { path })
    }

    fn create(path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = ?self.path, "Failed to release job history lock: {}", e);
        }
    }
}

/// Whether the process named in a lock file has exited. Only answerable
/// where `/proc` exists; elsewhere a lock is always treated as live.
#[cfg(target_os = "linux")]
fn owner_is_gone(pid: &str) -> bool {
    match pid.parse::<u32>() {
        Ok(pid) => !Path::new("/proc").join(pid.to_string()).exists(),
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
fn owner_is_gone(_pid: &str) -> bool {
    false
}

/// Records in a state file keyed by id, with the highest id ever assigned.
fn load_records(path: &Path) -> Result<(Option<JobId>, BTreeMap<JobId, MixJobRecord>)> {
    if !path.exists() {
        return Ok((None, BTreeMap::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job history: {:?}", path))?;
    let state: PersistedState = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse job history: {:?}", path))?;

    let mut last_id = state.last_id;
    let mut records = BTreeMap::new();
    for record in state.records {
        last_id = last_id.max(Some(record.id()));
        records.insert(record.id(), record);
    }
    Ok((last_id, records))
}
