//! mkvmerge-based [`Prober`] implementation.
//!
//! Runs `mkvmerge -J <file>` and maps the JSON identification report into a
//! [`ProbedFile`]. Track ids are mkvmerge's own ids, which are the ids the
//! muxer expects in `--audio-tracks` and friends.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tm_core::{format_size, language_name, ProbeError, ProbedFile, Track, TrackKind};

use super::{extension, join_parts, non_empty, stat_file, Prober};
use crate::tools::ToolConfig;

/// Extensions routed to mkvmerge.
const MATROSKA_EXTENSIONS: &[&str] = &["mkv", "mka", "mks", "webm"];

/// A prober backed by `mkvmerge -J`.
#[derive(Debug, Clone)]
pub struct MkvmergeProber {
    tool: ToolConfig,
}

impl MkvmergeProber {
    /// Create a new prober for the given mkvmerge tool.
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }

    /// Create a prober using the mkvmerge binary at `path` with the default
    /// timeout.
    pub fn with_path(path: PathBuf) -> Self {
        Self::new(ToolConfig {
            name: "mkvmerge".into(),
            path,
            timeout: Some(std::time::Duration::from_secs(300)),
        })
    }
}

#[async_trait]
impl Prober for MkvmergeProber {
    fn name(&self) -> &'static str {
        "mkvmerge"
    }

    fn supports(&self, path: &Path) -> bool {
        extension(path).is_some_and(|ext| MATROSKA_EXTENSIONS.contains(&ext.as_str()))
    }

    async fn probe(&self, path: &Path) -> Result<ProbedFile, ProbeError> {
        let stat = stat_file(path).await?;

        // mkvmerge exits with 2 for unrecognized files but still prints a
        // JSON report saying so; inspect the report before judging the exit.
        let mut cmd = self.tool.command();
        cmd.success_codes(&[0, 1, 2]);
        cmd.arg("-J").arg(path);
        let output = cmd.execute().await?;

        let mut file = parse_mkvmerge_json(path, &output.stdout)?;
        if output.code() == Some(2) && file.tracks.is_empty() && file.container.is_none() {
            return Err(ProbeError::InspectionFailed(format!(
                "mkvmerge exited with code 2: {}",
                output.stderr.trim()
            )));
        }

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
            "mkvmerge probe complete"
        );
        Ok(file)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MkvmergeOutput {
    container: Option<MkvmergeContainer>,
    #[serde(default)]
    tracks: Vec<MkvmergeTrack>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MkvmergeContainer {
    #[serde(rename = "type")]
    container_type: Option<String>,
    recognized: Option<bool>,
    supported: Option<bool>,
    properties: Option<MkvmergeContainerProperties>,
}

#[derive(Debug, Deserialize)]
struct MkvmergeContainerProperties {
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MkvmergeTrack {
    id: Option<u32>,
    #[serde(rename = "type")]
    track_type: Option<String>,
    codec: Option<String>,
    #[serde(default)]
    properties: MkvmergeTrackProperties,
}

#[derive(Debug, Default, Deserialize)]
struct MkvmergeTrackProperties {
    language: Option<String>,
    language_ietf: Option<String>,
    track_name: Option<String>,
    default_track: Option<bool>,
    forced_track: Option<bool>,
    codec_name: Option<String>,
    codec_id: Option<String>,
    encoding: Option<String>,
    pixel_dimensions: Option<String>,
    audio_channels: Option<u32>,
    audio_sampling_frequency: Option<f64>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse the JSON report of `mkvmerge -J`.
///
/// A container mkvmerge does not recognize (or recognizes but cannot read)
/// is reported as [`ProbeError::UnsupportedContainer`].
pub fn parse_mkvmerge_json(path: &Path, json: impl AsRef<[u8]>) -> Result<ProbedFile, ProbeError> {
    let output: MkvmergeOutput = serde_json::from_slice(json.as_ref())
        .map_err(|e| ProbeError::InspectionFailed(format!("mkvmerge JSON parse error: {e}")))?;

    if let Some(ref c) = output.container {
        if c.recognized == Some(false) || c.supported == Some(false) {
            let detail = if output.errors.is_empty() {
                format!("{} is not a container mkvmerge can read", path.display())
            } else {
                output.errors.join("; ")
            };
            return Err(ProbeError::UnsupportedContainer(detail));
        }
    }

    let container = output
        .container
        .as_ref()
        .and_then(|c| non_empty(c.container_type.clone()));
    let size = output
        .container
        .as_ref()
        .and_then(|c| c.properties.as_ref())
        .and_then(|p| p.file_size);
    let file_size = size.map(format_size);

    let mut tracks = Vec::with_capacity(output.tracks.len());
    for track in output.tracks {
        let Some(kind) = track_kind(track.track_type.as_deref()) else {
            tracing::trace!(track_type = ?track.track_type, id = ?track.id, "skipping non-track entry");
            continue;
        };
        let Some(id) = track.id else {
            tracing::warn!(path = %path.display(), %kind, "mkvmerge track without id, skipping");
            continue;
        };

        let props = track.properties;
        let attributes = build_attributes(kind, &props);
        let lang = non_empty(props.language_ietf).or_else(|| non_empty(props.language));
        let codec = non_empty(props.codec_name)
            .or_else(|| non_empty(track.codec))
            .or_else(|| non_empty(props.codec_id))
            .unwrap_or_else(|| "unknown".to_string());

        tracks.push(Track {
            track_id: id.to_string(),
            kind,
            codec,
            language_name: lang.as_deref().and_then(language_name).map(String::from),
            lang,
            track_name: non_empty(props.track_name),
            is_default: props.default_track,
            is_forced: props.forced_track,
            charset: non_empty(props.encoding),
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

fn track_kind(track_type: Option<&str>) -> Option<TrackKind> {
    match track_type? {
        "video" => Some(TrackKind::Video),
        "audio" => Some(TrackKind::Audio),
        "subtitles" | "subtitle" => Some(TrackKind::Subtitle),
        _ => None,
    }
}

fn build_attributes(kind: TrackKind, props: &MkvmergeTrackProperties) -> Option<String> {
    match kind {
        TrackKind::Video => non_empty(props.pixel_dimensions.clone()),
        TrackKind::Audio => {
            let mut parts = Vec::new();
            if let Some(ch) = props.audio_channels {
                parts.push(format!("{ch}ch"));
            }
            if let Some(freq) = props.audio_sampling_frequency {
                parts.push(format!("{} Hz", freq.round() as u64));
            }
            join_parts(parts)
        }
        TrackKind::Subtitle => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const MKV_REPORT: &str = r#"{
        "container": {
            "properties": { "file_size": 734003200, "title": "Episode 1" },
            "recognized": true,
            "supported": true,
            "type": "Matroska"
        },
        "errors": [],
        "tracks": [
            {
                "codec": "AVC/H.264/MPEG-4p10",
                "id": 0,
                "properties": {
                    "codec_id": "V_MPEG4/ISO/AVC",
                    "default_track": true,
                    "forced_track": false,
                    "language": "und",
                    "pixel_dimensions": "1920x1080"
                },
                "type": "video"
            },
            {
                "codec": "FLAC",
                "id": 1,
                "properties": {
                    "audio_channels": 2,
                    "audio_sampling_frequency": 48000,
                    "codec_id": "A_FLAC",
                    "default_track": true,
                    "forced_track": false,
                    "language": "jpn",
                    "language_ietf": "ja"
                },
                "type": "audio"
            },
            {
                "codec": "SubStationAlpha",
                "id": 2,
                "properties": {
                    "codec_id": "S_TEXT/ASS",
                    "default_track": false,
                    "encoding": "UTF-8",
                    "forced_track": false,
                    "language": "chi",
                    "language_ietf": "zh-Hans",
                    "track_name": "简体中文"
                },
                "type": "subtitles"
            }
        ],
        "warnings": []
    }"#;

    #[test]
    fn parses_tracks_in_container_order() {
        let file = parse_mkvmerge_json(Path::new("/media/ep01.mkv"), MKV_REPORT).unwrap();

        assert_eq!(file.container.as_deref(), Some("Matroska"));
        assert_eq!(file.size, Some(734_003_200));
        assert_eq!(file.tracks.len(), 3);

        let video = &file.tracks[0];
        assert_eq!(video.track_id, "0");
        assert_eq!(video.kind, TrackKind::Video);
        assert_eq!(video.codec, "AVC/H.264/MPEG-4p10");
        assert_eq!(video.attributes.as_deref(), Some("1920x1080"));
        assert_eq!(video.file_size.as_deref(), Some("700.00 MB"));

        let audio = &file.tracks[1];
        assert_eq!(audio.lang.as_deref(), Some("ja"), "language_ietf wins");
        assert_eq!(audio.language_name.as_deref(), Some("Japanese"));
        assert_eq!(audio.attributes.as_deref(), Some("2ch 48000 Hz"));

        let sub = &file.tracks[2];
        assert_eq!(sub.kind, TrackKind::Subtitle);
        assert_eq!(sub.lang.as_deref(), Some("zh-Hans"));
        assert_eq!(sub.language_name.as_deref(), Some("Simplified Chinese"));
        assert_eq!(sub.track_name.as_deref(), Some("简体中文"));
        assert_eq!(sub.charset.as_deref(), Some("UTF-8"));
        assert_eq!(sub.is_default, Some(false));
        assert_eq!(sub.attributes, None);
    }

    #[test]
    fn codec_falls_back_to_codec_id() {
        let json = r#"{ "tracks": [
            { "id": 3, "type": "audio", "properties": { "codec_id": "A_OPUS" } }
        ] }"#;
        let file = parse_mkvmerge_json(Path::new("a.mka"), json).unwrap();
        assert_eq!(file.tracks[0].codec, "A_OPUS");
        assert_eq!(file.tracks[0].is_default, None);
    }

    #[test]
    fn codec_name_preferred_over_codec() {
        let json = r#"{ "tracks": [
            { "id": 0, "type": "audio", "codec": "AAC",
              "properties": { "codec_name": "AAC LC", "codec_id": "A_AAC" } }
        ] }"#;
        let file = parse_mkvmerge_json(Path::new("a.mka"), json).unwrap();
        assert_eq!(file.tracks[0].codec, "AAC LC");
    }

    #[test]
    fn unrecognized_container_is_unsupported() {
        let json = r#"{
            "container": { "recognized": false, "supported": false },
            "errors": ["The type of file 'notes.mkv' could not be recognized."],
            "tracks": []
        }"#;
        let result = parse_mkvmerge_json(Path::new("notes.mkv"), json);
        assert_matches!(
            result,
            Err(ProbeError::UnsupportedContainer(msg)) if msg.contains("could not be recognized")
        );
    }

    #[test]
    fn track_without_id_is_skipped() {
        let json = r#"{ "tracks": [
            { "type": "audio", "codec": "AAC" },
            { "id": 1, "type": "buttons", "codec": "VobBtn" },
            { "id": 2, "type": "audio", "codec": "AC-3" }
        ] }"#;
        let file = parse_mkvmerge_json(Path::new("a.mkv"), json).unwrap();
        let ids: Vec<&str> = file.tracks.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, ["2"]);
    }

    #[test]
    fn malformed_json_is_inspection_failure() {
        let result = parse_mkvmerge_json(Path::new("a.mkv"), "");
        assert_matches!(result, Err(ProbeError::InspectionFailed(_)));
    }

    #[test]
    fn invalid_utf8_is_inspection_failure() {
        let json: &[u8] = b"{\"tracks\":[{\"id\":0,\"type\":\"audio\",\
            \"properties\":{\"track_name\":\"bad\xffname\"}}]}";
        let result = parse_mkvmerge_json(Path::new("a.mka"), json);
        assert_matches!(result, Err(ProbeError::InspectionFailed(_)));
    }

    #[test]
    fn supports_matroska_family_only() {
        let prober = MkvmergeProber::with_path(PathBuf::from("mkvmerge"));
        assert!(prober.supports(Path::new("a.mkv")));
        assert!(prober.supports(Path::new("a.MKA")));
        assert!(prober.supports(Path::new("a.mks")));
        assert!(prober.supports(Path::new("a.webm")));
        assert!(!prober.supports(Path::new("a.mp4")));
        assert!(!prober.supports(Path::new("mkv")));
    }

    #[tokio::test]
    async fn missing_file_checked_before_spawning() {
        let prober = MkvmergeProber::with_path(PathBuf::from("nonexistent_mkvmerge_xyz"));
        let result = prober.probe(Path::new("/nonexistent/ep01.mkv")).await;
        assert_matches!(result, Err(ProbeError::FileNotFound(_)));
    }
}
