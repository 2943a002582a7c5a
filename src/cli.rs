use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tm_core::TrackKind;

#[derive(Parser)]
#[command(name = "trackmix")]
#[command(author, version, about = "Probe media tracks and remux a selection into Matroska")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a media file and list its tracks
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Only list tracks of this kind (video, audio, subtitle)
        #[arg(long)]
        kind: Option<TrackKind>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mix selected tracks into a new Matroska file
    #[command(after_help = "SPEC is PATH:ID[@LANG][,ID[@LANG]...], e.g. movie.mkv:0 or movie.mkv:1@ja,2")]
    Mix {
        /// Output file (.mkv is added when there is no extension)
        #[arg(short, long, required = true)]
        output: PathBuf,

        /// Video tracks to include
        #[arg(long = "video", value_name = "SPEC", value_parser = parse_track_spec)]
        video: Vec<TrackSpec>,

        /// Audio tracks to include
        #[arg(long = "audio", value_name = "SPEC", value_parser = parse_track_spec)]
        audio: Vec<TrackSpec>,

        /// Subtitle tracks to include
        #[arg(long = "subtitle", value_name = "SPEC", value_parser = parse_track_spec)]
        subtitle: Vec<TrackSpec>,
    },

    /// Show persisted mix job history
    Jobs {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Tracks picked from one file on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSpec {
    pub path: PathBuf,
    /// Track ids with an optional language override.
    pub tracks: Vec<(String, Option<String>)>,
}

/// Parse `PATH:ID[@LANG][,ID[@LANG]...]`.
///
/// The path is everything before the last `:`, so paths that contain colons
/// still work.
pub fn parse_track_spec(s: &str) -> Result<TrackSpec, String> {
    let (path, ids) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PATH:ID[,ID...], got '{s}'"))?;
    if path.trim().is_empty() {
        return Err(format!("missing file path in '{s}'"));
    }

    let mut tracks = Vec::new();
    for part in ids.split(',') {
        let (id, lang) = match part.split_once('@') {
            Some((id, lang)) => (id.trim(), Some(lang.trim())),
            None => (part.trim(), None),
        };
        if id.is_empty() {
            return Err(format!("empty track id in '{s}'"));
        }
        let lang = match lang {
            Some("") => return Err(format!("empty language for track {id} in '{s}'")),
            other => other.map(str::to_string),
        };
        tracks.push((id.to_string(), lang));
    }

    Ok(TrackSpec {
        path: PathBuf::from(path),
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_track() {
        let spec = parse_track_spec("movie.mkv:0").unwrap();
        assert_eq!(spec.path, PathBuf::from("movie.mkv"));
        assert_eq!(spec.tracks, [("0".to_string(), None)]);
    }

    #[test]
    fn several_tracks_with_languages() {
        let spec = parse_track_spec("/media/ep 01.mkv:1@ja, 2").unwrap();
        assert_eq!(spec.path, PathBuf::from("/media/ep 01.mkv"));
        assert_eq!(
            spec.tracks,
            [
                ("1".to_string(), Some("ja".to_string())),
                ("2".to_string(), None)
            ]
        );
    }

    #[test]
    fn path_may_contain_colons() {
        let spec = parse_track_spec("C:\\media\\a.mkv:3").unwrap();
        assert_eq!(spec.path, PathBuf::from("C:\\media\\a.mkv"));
        assert_eq!(spec.tracks[0].0, "3");
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!(parse_track_spec("movie.mkv").is_err());
        assert!(parse_track_spec(":0").is_err());
        assert!(parse_track_spec("movie.mkv:").is_err());
        assert!(parse_track_spec("movie.mkv:0,,1").is_err());
        assert!(parse_track_spec("movie.mkv:0@").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
