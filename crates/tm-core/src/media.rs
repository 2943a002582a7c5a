//! Media-domain model produced by probing.
//!
//! [`ProbedFile`] and [`Track`] form the read model: once a prober returns
//! them they never change. User selection state lives elsewhere and refers to
//! tracks by `(path, track_id)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

// ---------------------------------------------------------------------------
// TrackKind
// ---------------------------------------------------------------------------

/// The closed set of stream kinds a mix can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

impl TrackKind {
    /// All kinds, in the order their groups appear in a mixed output.
    pub const ALL: [TrackKind; 3] = [TrackKind::Video, TrackKind::Audio, TrackKind::Subtitle];

    /// Lowercase name used on the wire and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "subtitle" | "subtitles" => Ok(Self::Subtitle),
            other => Err(format!("unknown track kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Track / ProbedFile
// ---------------------------------------------------------------------------

/// One stream inside a probed file.
///
/// Every optional field is `None` when the inspection tool did not report it;
/// `is_default: None` means "unknown", not "false".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Identifier as reported by the inspection tool, unique within the file.
    pub track_id: String,
    pub kind: TrackKind,
    pub codec: String,
    pub lang: Option<String>,
    pub language_name: Option<String>,
    pub track_name: Option<String>,
    pub is_default: Option<bool>,
    pub is_forced: Option<bool>,
    pub charset: Option<String>,
    /// Short human-readable summary (resolution, channel layout, ...).
    pub attributes: Option<String>,
    pub container: Option<String>,
    /// Human-readable size of the containing file.
    pub file_size: Option<String>,
}

/// A source file and every track discovered in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbedFile {
    pub path: PathBuf,
    /// Modification time observed when the file was probed.
    #[serde(skip)]
    pub modified: Option<SystemTime>,
    pub container: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
    pub tracks: Vec<Track>,
}

impl ProbedFile {
    /// Look up a track by its id.
    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Whether the file contains a track with the given id.
    pub fn contains(&self, track_id: &str) -> bool {
        self.track(track_id).is_some()
    }

    /// Iterate over the tracks of one kind, in probe order.
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    /// A copy of this file restricted to one kind of track.
    pub fn of_kind(&self, kind: TrackKind) -> ProbedFile {
        ProbedFile {
            path: self.path.clone(),
            modified: self.modified,
            container: self.container.clone(),
            size: self.size,
            tracks: self.tracks_of(kind).cloned().collect(),
        }
    }

    /// The path as given to the prober.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

/// Human-readable name for common language codes (ISO 639-1/2, BCP 47).
pub fn language_name(code: &str) -> Option<&'static str> {
    let normalized = code.trim().to_lowercase();
    if normalized.starts_with("zh-hans") {
        return Some("Simplified Chinese");
    }
    if normalized.starts_with("zh-hant")
        || normalized.starts_with("zh-hk")
        || normalized.starts_with("zh-mo")
    {
        return Some("Traditional Chinese");
    }
    let name = match normalized.as_str() {
        "jpn" | "ja" => "Japanese",
        "eng" | "en" => "English",
        "chi" | "zho" | "zh" => "Chinese",
        "chs" | "zh-cn" | "cmn" => "Simplified Chinese",
        "cht" | "zh-tw" => "Traditional Chinese",
        "kor" | "ko" => "Korean",
        "fra" | "fre" | "fr" => "French",
        "deu" | "ger" | "de" => "German",
        "spa" | "es" => "Spanish",
        _ => return None,
    };
    Some(name)
}

/// Format a byte count as `"512 B"`, `"1.50 KB"`, `"4.20 GB"`, ...
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut idx = 0;
    while size >= 1024.0 && idx < UNITS.len() - 1 {
        size /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{} {}", bytes, UNITS[idx])
    } else {
        format!("{:.2} {}", size, UNITS[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, kind: TrackKind) -> Track {
        Track {
            track_id: id.to_string(),
            kind,
            codec: "unknown".into(),
            lang: None,
            language_name: None,
            track_name: None,
            is_default: None,
            is_forced: None,
            charset: None,
            attributes: None,
            container: None,
            file_size: None,
        }
    }

    #[test]
    fn track_kind_parse() {
        assert_eq!("video".parse::<TrackKind>().unwrap(), TrackKind::Video);
        assert_eq!("Audio".parse::<TrackKind>().unwrap(), TrackKind::Audio);
        assert_eq!("subtitles".parse::<TrackKind>().unwrap(), TrackKind::Subtitle);
        assert!("attachment".parse::<TrackKind>().is_err());
    }

    #[test]
    fn track_kind_serde_lowercase() {
        assert_eq!(serde_json::to_string(&TrackKind::Subtitle).unwrap(), "\"subtitle\"");
        assert_eq!(TrackKind::Audio.to_string(), "audio");
    }

    #[test]
    fn track_serializes_camel_case() {
        let json = serde_json::to_value(track("3", TrackKind::Audio)).unwrap();
        assert_eq!(json["trackId"], "3");
        assert!(json["isDefault"].is_null());
        assert!(json.get("languageName").is_some());
    }

    #[test]
    fn probed_file_lookup_and_filter() {
        let file = ProbedFile {
            path: PathBuf::from("/media/ep01.mkv"),
            modified: None,
            container: Some("Matroska".into()),
            size: Some(1024),
            tracks: vec![
                track("0", TrackKind::Video),
                track("1", TrackKind::Audio),
                track("2", TrackKind::Audio),
                track("3", TrackKind::Subtitle),
            ],
        };

        assert!(file.contains("2"));
        assert!(!file.contains("9"));
        assert_eq!(file.track("3").map(|t| t.kind), Some(TrackKind::Subtitle));

        let audio = file.of_kind(TrackKind::Audio);
        let ids: Vec<&str> = audio.tracks.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(audio.path, file.path);
    }

    #[test]
    fn language_names() {
        assert_eq!(language_name("jpn"), Some("Japanese"));
        assert_eq!(language_name(" EN "), Some("English"));
        assert_eq!(language_name("zh-Hans-CN"), Some("Simplified Chinese"));
        assert_eq!(language_name("zh-HK"), Some("Traditional Chinese"));
        assert_eq!(language_name("und"), None);
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }
}
