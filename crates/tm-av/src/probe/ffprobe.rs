//! FFprobe-based [`Prober`] implementation.
//!
//! Shells out to `ffprobe -v error -print_format json -show_format -show_streams`
//! and maps the JSON output into a [`ProbedFile`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tm_core::{format_size, language_name, Error, ProbeError, ProbedFile, Track, TrackKind};

use super::{join_parts, non_empty, stat_file, Prober};
use crate::tools::ToolConfig;

/// Marker ffprobe prints when the input is not a media container.
const INVALID_DATA: &str = "Invalid data found";

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    tool: ToolConfig,
}

impl FfprobeProber {
    /// Create a new prober for the given ffprobe tool.
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }

    /// Create a prober using the ffprobe binary at `path` with the default
    /// timeout.
    pub fn with_path(path: PathBuf) -> Self {
        Self::new(ToolConfig {
            name: "ffprobe".into(),
            path,
            timeout: Some(std::time::Duration::from_secs(300)),
        })
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn supports(&self, path: &Path) -> bool {
        // ffprobe understands nearly every media format.
        path.extension().is_some()
    }

    async fn probe(&self, path: &Path) -> Result<ProbedFile, ProbeError> {
        let stat = stat_file(path).await?;

        let mut cmd = self.tool.command();
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path);

        let output = match cmd.execute().await {
            Ok(output) => output,
            Err(Error::ToolExit { message, .. }) if message.contains(INVALID_DATA) => {
                return Err(ProbeError::UnsupportedContainer(format!(
                    "{}: {message}",
                    path.display()
                )));
            }
            Err(e) => return Err(ProbeError::InspectionFailed(e.to_string())),
        };

        let mut file = parse_ffprobe_json(path, &output.stdout)?;
        file.modified = stat.modified;
        if file.size.is_none() {
            file.size = Some(stat.size);
            let readable = format_size(stat.size);
            for track in &mut file.tracks {
                track.file_size = Some(readable.clone());
            }
        }

        tracing::debug!(
            path = %path.display(),
            tracks = file.tracks.len(),
            "ffprobe probe complete"
        );
        Ok(file)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<u32>,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    disposition: Option<FfprobeDisposition>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    default: Option<u8>,
    forced: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
    charset: Option<String>,
    encoding: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse the JSON report of `ffprobe -show_format -show_streams`.
///
/// Streams that are not video, audio or subtitles are skipped, as are
/// streams without an index.
pub fn parse_ffprobe_json(path: &Path, json: impl AsRef<[u8]>) -> Result<ProbedFile, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(json.as_ref())
        .map_err(|e| ProbeError::InspectionFailed(format!("ffprobe JSON parse error: {e}")))?;

    let container = output
        .format
        .as_ref()
        .and_then(|f| non_empty(f.format_name.clone()));
    let size = output
        .format
        .as_ref()
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok());
    let file_size = size.map(format_size);

    let mut tracks = Vec::with_capacity(output.streams.len());
    for stream in output.streams {
        let Some(kind) = stream_kind(stream.codec_type.as_deref()) else {
            tracing::trace!(
                codec_type = ?stream.codec_type,
                index = ?stream.index,
                "skipping non-track stream"
            );
            continue;
        };
        let Some(index) = stream.index else {
            tracing::warn!(path = %path.display(), %kind, "ffprobe stream without index, skipping");
            continue;
        };

        let attributes = build_attributes(kind, &stream);
        let lang = non_empty(stream.tags.language);
        let (is_default, is_forced) = match stream.disposition {
            Some(d) => (d.default.map(|v| v == 1), d.forced.map(|v| v == 1)),
            None => (None, None),
        };

        tracks.push(Track {
            track_id: index.to_string(),
            kind,
            codec: non_empty(stream.codec_name).unwrap_or_else(|| "unknown".to_string()),
            language_name: lang.as_deref().and_then(language_name).map(String::from),
            lang,
            track_name: non_empty(stream.tags.title),
            is_default,
            is_forced,
            charset: non_empty(stream.tags.charset.or(stream.tags.encoding)),
            attributes,
            container: container.clone(),
            file_size: file_size.clone(),
        });
    }

    Ok(ProbedFile {
        path: path.to_path_buf(),
        modified: None,
        container,
        size,
        tracks,
    })
}

fn stream_kind(codec_type: Option<&str>) -> Option<TrackKind> {
    match codec_type? {
        "video" => Some(TrackKind::Video),
        "audio" => Some(TrackKind::Audio),
        "subtitle" => Some(TrackKind::Subtitle),
        _ => None,
    }
}

fn build_attributes(kind: TrackKind, stream: &FfprobeStream) -> Option<String> {
    match kind {
        TrackKind::Video => {
            let mut parts = Vec::new();
            if let (Some(w), Some(h)) = (stream.width, stream.height) {
                parts.push(format!("{w}x{h}"));
            }
            if let Some(rate) = stream.r_frame_rate.as_deref() {
                if rate != "0/0" {
                    parts.push(rate.to_string());
                }
            }
            join_parts(parts)
        }
        TrackKind::Audio => {
            let mut parts = Vec::new();
            if let Some(ch) = stream.channels {
                parts.push(format!("{ch}ch"));
            }
            if let Some(layout) = stream.channel_layout.as_deref() {
                parts.push(layout.to_string());
            }
            join_parts(parts)
        }
        TrackKind::Subtitle => non_empty(stream.tags.title.clone()),
    }
}
