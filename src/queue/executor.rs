//! Execution of a single claimed mix job.
//!
//! Runs inside its own spawned task so that a panic in a muxer surfaces as
//! a join error at the worker instead of taking the worker down.

use std::sync::Arc;
use std::time::Duration;

use tm_av::{MuxReport, MuxRequest, MuxTrack, Muxer, Workspace};
use tm_core::config::MixConfig;
use tm_core::MixExecutionError;
use tokio_util::sync::CancellationToken;

use crate::state::MixJob;

/// Muxer output waiting in its staging area.
#[derive(Debug)]
pub(crate) struct Staged {
    pub workspace: Workspace,
    pub report: MuxReport,
}

/// Flatten a job into the muxer's track list.
///
/// Each track's language is its override, else the configured fallback for
/// its kind, else `None` to keep the source language.
pub(crate) fn mux_request(job: &MixJob, output: std::path::PathBuf, mix: &MixConfig) -> MuxRequest {
    let tracks = job
        .inputs
        .iter()
        .flat_map(|input| {
            input.track_ids.iter().map(move |id| MuxTrack {
                source: input.path.clone(),
                track_id: id.clone(),
                kind: input.kind,
                language: input
                    .track_langs
                    .get(id)
                    .cloned()
                    .or_else(|| mix.default_language(input.kind).map(str::to_string)),
            })
        })
        .collect();

    MuxRequest { output, tracks }
}

/// Stage and mux one job.
///
/// On error the staging area has already been removed.
pub(crate) async fn run(
    job: MixJob,
    muxer: Arc<dyn Muxer>,
    mix: Arc<MixConfig>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> Result<Staged, MixExecutionError> {
    if let Some(parent) = job.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MixExecutionError::Io(format!(
                    "failed to create output directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let workspace = Workspace::for_output(&job.output_path)?;
    let request = mux_request(&job, workspace.staged(), &mix);
    tracing::debug!(
        job_id = %job.id,
        muxer = muxer.name(),
        staged = %request.output.display(),
        tracks = request.tracks.len(),
        "muxing"
    );

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, muxer.mux(&request, &cancel)).await {
            Ok(result) => result.map_err(MixExecutionError::from),
            Err(_) => Err(MixExecutionError::Timeout(limit)),
        },
        None => muxer
            .mux(&request, &cancel)
            .await
            .map_err(MixExecutionError::from),
    };

    match result {
        Ok(report) => {
            for warning in &report.warnings {
                tracing::warn!(job_id = %job.id, "{}", warning);
            }
            Ok(Staged { workspace, report })
        }
        Err(e) => {
            workspace.discard();
            Err(e)
        }
    }
}
