//! Error types for trackmix.
//!
//! Three domain enums mirror the three places a mix can go wrong:
//!
//! - [`ProbeError`] is returned synchronously by a prober.
//! - [`SubmissionError`] is returned synchronously by the queue's `submit`;
//!   a job that fails validation is never created.
//! - [`MixExecutionError`] is produced inside a worker and recorded as the
//!   `failed` message of a job; it never escapes the worker pool.
//!
//! All crates funnel lower-level failures (tool execution, I/O, lookups)
//! into [`Error`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Failure to enumerate the tracks of a media file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The path does not exist or is not a regular file.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file exists but is not a container any backend understands.
    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),

    /// The inspection tool could not be run, exited non-zero, or produced
    /// output that could not be parsed.
    #[error("inspection failed: {0}")]
    InspectionFailed(String),
}

/// Rejection of a mix request before any job record exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// No input carries at least one track id.
    #[error("no tracks selected for mixing")]
    EmptyInputs,

    /// The output path is empty, names a directory, or has an extension the
    /// muxer cannot write.
    #[error("invalid output path: {0}")]
    InvalidOutputPath(String),

    /// One of the inputs is malformed.
    #[error("invalid input #{index}: {reason}")]
    InvalidInput {
        /// Zero-based position of the offending input.
        index: usize,
        /// Human-readable reason.
        reason: String,
    },
}

/// How an external process ended when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    /// Name of the tool (e.g. "mkvmerge").
    pub tool: String,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Trimmed diagnostic output.
    pub detail: String,
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} exited with code {}", self.tool, code)?,
            None => write!(f, "{} did not exit normally", self.tool)?,
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Failure while executing a queued mix job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MixExecutionError {
    /// The mux subprocess failed to start or exited unsuccessfully.
    #[error("mux failed: {0}")]
    SubprocessFailed(ExitInfo),

    /// The job exceeded its configured time budget and was terminated.
    #[error("mux timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The muxer reported success but wrote no output file.
    #[error("output file was not created: {}", .0.display())]
    OutputMissing(PathBuf),

    /// The muxer reported success but the output file is empty.
    #[error("output file is empty: {}", .0.display())]
    OutputEmpty(PathBuf),

    /// The job was cancelled while running.
    #[error("cancelled")]
    Cancelled,

    /// Preparing or finalizing the output on disk failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Anything else that went wrong inside the worker.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Unified error type covering every failure mode in trackmix.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "track").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request or configuration data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool could not be located or spawned.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool ran but exited unsuccessfully.
    #[error("Tool error [{tool}]: exited with {}: {message}", exit_label(.code))]
    ToolExit {
        /// Name of the tool that failed.
        tool: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Trimmed stderr (or stdout when stderr is empty).
        message: String,
    },

    /// An external tool exceeded its time budget and was killed.
    #[error("Tool error [{tool}]: timed out after {after:?}")]
    Timeout {
        /// Name of the tool.
        tool: String,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// An external tool was killed because its work was cancelled.
    #[error("Tool error [{tool}]: cancelled")]
    Cancelled {
        /// Name of the tool.
        tool: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// A mix job failed while running.
    #[error("Mix error: {0}")]
    Mix(#[from] MixExecutionError),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

impl From<Error> for MixExecutionError {
    fn from(err: Error) -> Self {
        match err {
            Error::Tool { tool, message } => MixExecutionError::SubprocessFailed(ExitInfo {
                tool,
                code: None,
                detail: message,
            }),
            Error::ToolExit {
                tool,
                code,
                message,
            } => MixExecutionError::SubprocessFailed(ExitInfo {
                tool,
                code,
                detail: message,
            }),
            Error::Timeout { after, .. } => MixExecutionError::Timeout(after),
            Error::Cancelled { .. } => MixExecutionError::Cancelled,
            Error::Io { source } => MixExecutionError::Io(source.to_string()),
            Error::Mix(inner) => inner,
            other => MixExecutionError::Internal(other.to_string()),
        }
    }
}

impl From<Error> for ProbeError {
    fn from(err: Error) -> Self {
        match err {
            Error::Probe(inner) => inner,
            other => ProbeError::InspectionFailed(other.to_string()),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "signal".to_string(),
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
