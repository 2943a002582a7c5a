use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tm_core::{JobId, TrackKind};

/// The tracks of one kind taken from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixInput {
    pub path: PathBuf,
    pub kind: TrackKind,
    /// Track ids in output order.
    pub track_ids: Vec<String>,
    /// Language overrides keyed by track id.
    #[serde(default)]
    pub track_langs: BTreeMap<String, String>,
}

impl MixInput {
    pub fn new(path: impl Into<PathBuf>, kind: TrackKind) -> Self {
        Self {
            path: path.into(),
            kind,
            track_ids: Vec::new(),
            track_langs: BTreeMap::new(),
        }
    }

    pub fn with_track(mut self, track_id: impl Into<String>) -> Self {
        self.track_ids.push(track_id.into());
        self
    }

    pub fn with_lang(mut self, track_id: impl Into<String>, lang: impl Into<String>) -> Self {
        let track_id = track_id.into();
        if !self.track_ids.contains(&track_id) {
            self.track_ids.push(track_id.clone());
        }
        self.track_langs.insert(track_id, lang.into());
        self
    }
}

/// A validated, immutable unit of mix work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixJob {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    pub output_path: PathBuf,
    pub inputs: Vec<MixInput>,
}

impl MixJob {
    /// Total number of tracks the job writes.
    pub fn track_count(&self) -> usize {
        self.inputs.iter().map(|i| i.track_ids.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A job together with its observable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixJobRecord {
    pub job: MixJob,
    pub status: JobStatus,
    /// Human-readable outcome once the job is terminal.
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MixJobRecord {
    pub fn new(job: MixJob) -> Self {
        Self {
            job,
            status: JobStatus::Queued,
            message: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.job.id
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running, None)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.finish(JobStatus::Success, Some(message.into()))
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.finish(JobStatus::Failed, Some(message.into()))
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.finish(JobStatus::Cancelled, Some("cancelled".to_string()))
    }

    fn finish(&mut self, to: JobStatus, message: Option<String>) -> Result<(), TransitionError> {
        self.transition(to, message)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: JobStatus, message: Option<String>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.message = message;
        Ok(())
    }
}

/// Number of records in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobCounts {
    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Running => self.running,
            JobStatus::Success => self.success,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    pub(crate) fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Success => self.success += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.success + self.failed + self.cancelled
    }
}
