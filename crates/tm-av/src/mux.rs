//! Track muxing with mkvmerge.
//!
//! A [`MuxRequest`] is a flat, ordered list of `(source, track id, kind,
//! language)` tuples plus an output path. [`MkvmergeMuxer`] turns it into a
//! single mkvmerge invocation: consecutive tracks from the same source and of
//! the same kind become one mkvmerge input file, and a global
//! `--track-order` keeps the output in request order.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tm_core::config::MixConfig;
use tm_core::TrackKind;

use crate::tools::{ToolConfig, ToolRegistry};

/// mkvmerge exits with 1 when it finished with warnings.
const MKVMERGE_SUCCESS_CODES: &[i32] = &[0, 1];

/// Warning mkvmerge prints when it skips a track id that is not in a source.
const TRACK_NOT_FOUND: &str = "was requested but not found";

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// One track to copy into the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxTrack {
    pub source: PathBuf,
    pub track_id: String,
    pub kind: TrackKind,
    /// Language tag to write; `None` keeps the source's language.
    pub language: Option<String>,
}

/// Everything a [`Muxer`] needs to produce one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxRequest {
    /// Where the muxer writes. The caller owns moving it to its final place.
    pub output: PathBuf,
    /// Tracks in output order.
    pub tracks: Vec<MuxTrack>,
}

/// Result of a successful mux.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxReport {
    pub output: PathBuf,
    pub tracks_written: usize,
    /// Warnings the tool printed while still succeeding.
    pub warnings: Vec<String>,
}

/// The capability of writing selected tracks into a new container.
///
/// Implementations must honor `cancel` by terminating any child process and
/// returning [`tm_core::Error::Cancelled`]. Dropping the returned future must
/// also terminate the child.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Human-readable name of the implementation.
    fn name(&self) -> &'static str;

    async fn mux(
        &self,
        request: &MuxRequest,
        cancel: &CancellationToken,
    ) -> tm_core::Result<MuxReport>;
}

// ---------------------------------------------------------------------------
// MkvmergeMuxer
// ---------------------------------------------------------------------------

/// Per-track flags applied to every output track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxFlags {
    pub reset_track_names: bool,
    pub mark_default: bool,
    pub clear_forced: bool,
}

impl Default for MuxFlags {
    fn default() -> Self {
        Self {
            reset_track_names: true,
            mark_default: true,
            clear_forced: true,
        }
    }
}

impl From<&MixConfig> for MuxFlags {
    fn from(config: &MixConfig) -> Self {
        Self {
            reset_track_names: config.reset_track_names,
            mark_default: config.mark_default,
            clear_forced: config.clear_forced,
        }
    }
}

/// [`Muxer`] backed by a single mkvmerge invocation.
#[derive(Debug, Clone)]
pub struct MkvmergeMuxer {
    tool: ToolConfig,
    flags: MuxFlags,
}

impl MkvmergeMuxer {
    pub fn new(tool: ToolConfig, flags: MuxFlags) -> Self {
        Self { tool, flags }
    }

    /// Build a muxer from the registry's mkvmerge entry.
    pub fn from_registry(tools: &ToolRegistry, flags: MuxFlags) -> tm_core::Result<Self> {
        let tool = tools.require("mkvmerge")?.clone();
        Ok(Self::new(tool, flags))
    }

    /// Build the full mkvmerge argument list for `request`.
    ///
    /// Paths are passed as-is so that file names which are not valid UTF-8
    /// reach mkvmerge unchanged.
    pub fn build_args(&self, request: &MuxRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), request.output.clone().into()];
        let mut order = Vec::with_capacity(request.tracks.len());

        for (file_index, group) in group_inputs(&request.tracks).into_iter().enumerate() {
            let ids: Vec<&str> = group.tracks.iter().map(|t| t.track_id.as_str()).collect();

            for kind in TrackKind::ALL {
                if kind == group.kind {
                    args.push(tracks_flag(kind).into());
                    args.push(ids.join(",").into());
                } else {
                    args.push(disable_flag(kind).into());
                }
            }

            for track in &group.tracks {
                let id = &track.track_id;
                if let Some(lang) = track.language.as_deref() {
                    args.push("--language".into());
                    args.push(format!("{id}:{lang}").into());
                }
                if self.flags.reset_track_names {
                    args.push("--track-name".into());
                    args.push(format!("{id}:").into());
                }
                if self.flags.mark_default {
                    args.push("--default-track-flag".into());
                    args.push(format!("{id}:yes").into());
                }
                if self.flags.clear_forced {
                    args.push("--forced-display-flag".into());
                    args.push(format!("{id}:no").into());
                }
                order.push(format!("{file_index}:{id}"));
            }

            args.push(group.source.into());
        }

        if !order.is_empty() {
            args.push("--track-order".into());
            args.push(order.join(",").into());
        }

        args
    }
}

#[async_trait]
impl Muxer for MkvmergeMuxer {
    fn name(&self) -> &'static str {
        "mkvmerge"
    }

    async fn mux(
        &self,
        request: &MuxRequest,
        cancel: &CancellationToken,
    ) -> tm_core::Result<MuxReport> {
        if request.tracks.is_empty() {
            return Err(tm_core::Error::Validation("no tracks to mux".into()));
        }

        let args = self.build_args(request);
        tracing::info!(
            output = %request.output.display(),
            tracks = request.tracks.len(),
            "mkvmerge mux"
        );

        // The job timeout is enforced by the caller; the tool's inspection
        // timeout does not apply to a mux.
        let mut cmd = self.tool.command();
        cmd.timeout(None)
            .success_codes(MKVMERGE_SUCCESS_CODES)
            .cancel_on(cancel.clone())
            .args(args);
        let output = cmd.execute().await?;

        let warnings: Vec<String> = output
            .stdout_text()
            .lines()
            .filter(|l| l.starts_with("Warning:"))
            .map(|l| l.trim().to_string())
            .collect();

        // mkvmerge drops unknown track ids with only a warning; a mix that
        // lost a requested track is a failure.
        let dropped: Vec<&str> = warnings
            .iter()
            .filter(|w| w.contains(TRACK_NOT_FOUND))
            .map(String::as_str)
            .collect();
        if !dropped.is_empty() {
            return Err(tm_core::Error::ToolExit {
                tool: "mkvmerge".into(),
                code: output.code(),
                message: dropped.join("\n"),
            });
        }
        if !warnings.is_empty() {
            tracing::warn!(count = warnings.len(), "mkvmerge finished with warnings");
        }

        Ok(MuxReport {
            output: request.output.clone(),
            tracks_written: request.tracks.len(),
            warnings,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Consecutive tracks sharing a source and a kind.
struct InputGroup<'a> {
    source: &'a Path,
    kind: TrackKind,
    tracks: Vec<&'a MuxTrack>,
}

fn group_inputs(tracks: &[MuxTrack]) -> Vec<InputGroup<'_>> {
    let mut groups: Vec<InputGroup<'_>> = Vec::new();
    for track in tracks {
        match groups.last_mut() {
            Some(g) if g.source == track.source && g.kind == track.kind => g.tracks.push(track),
            _ => groups.push(InputGroup {
                source: &track.source,
                kind: track.kind,
                tracks: vec![track],
            }),
        }
    }
    groups
}

fn tracks_flag(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Video => "--video-tracks",
        TrackKind::Audio => "--audio-tracks",
        TrackKind::Subtitle => "--subtitle-tracks",
    }
}

fn disable_flag(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Video => "--no-video",
        TrackKind::Audio => "--no-audio",
        TrackKind::Subtitle => "--no-subtitles",
    }
}
