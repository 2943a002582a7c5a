//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML by the binary's config
//! loader. Every section defaults sensibly so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::media::TrackKind;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub probe: ProbeConfig,
    pub queue: QueueConfig,
    pub mix: MixConfig,
}

impl Config {
    /// Check the configuration.
    ///
    /// Values that would make the queue unusable are errors; everything else
    /// is returned as a list of non-fatal warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.queue.max_concurrent_mix_jobs == 0 {
            return Err(Error::Validation(
                "queue.max_concurrent_mix_jobs must be at least 1".into(),
            ));
        }
        if self.queue.history_limit == 0 {
            return Err(Error::Validation(
                "queue.history_limit must be at least 1".into(),
            ));
        }

        let mut warnings = Vec::new();

        let tools = [
            ("tools.ffprobe_path", &self.tools.ffprobe_path),
            ("tools.mkvmerge_path", &self.tools.mkvmerge_path),
        ];
        for (key, path) in tools {
            if let Some(path) = path {
                if !path.exists() {
                    warnings.push(format!("{key} '{}' does not exist", path.display()));
                }
            }
        }

        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; probes will run without a timeout".into());
        }

        for (kind, lang) in &self.mix.default_languages {
            if kind.parse::<TrackKind>().is_err() {
                warnings.push(format!(
                    "mix.default_languages key '{kind}' is not a track kind (video, audio, subtitle)"
                ));
            }
            if lang.trim().is_empty() {
                warnings.push(format!("mix.default_languages.{kind} is empty and will be ignored"));
            }
        }

        if let Some(ref state_path) = self.queue.state_path {
            if state_path.is_dir() {
                warnings.push(format!(
                    "queue.state_path '{}' is a directory",
                    state_path.display()
                ));
            }
        }

        Ok(warnings)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffprobe_path: Option<PathBuf>,
    pub mkvmerge_path: Option<PathBuf>,
    /// Time budget for a single inspection run; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: None,
            mkvmerge_path: None,
            timeout_secs: 300,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Track prober settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Memoize probe results by `(path, mtime)`.
    pub cache: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { cache: true }
    }
}

/// Mix queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent_mix_jobs: usize,
    /// Per-job time budget; 0 disables it.
    pub job_timeout_secs: u64,
    /// Maximum number of terminal records kept in history.
    pub history_limit: usize,
    /// Where job history is persisted. `None` keeps it in memory only.
    pub state_path: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_mix_jobs: 1,
            job_timeout_secs: 3600,
            history_limit: 1000,
            state_path: None,
        }
    }
}

impl QueueConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

/// Output shaping applied to every mixed track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Clear the name of every output track.
    pub reset_track_names: bool,
    /// Flag every output track as default.
    pub mark_default: bool,
    /// Clear the forced-display flag of every output track.
    pub clear_forced: bool,
    /// Language applied to tracks of a kind when the request carries none,
    /// keyed by `video`, `audio` or `subtitle`.
    pub default_languages: BTreeMap<String, String>,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            reset_track_names: true,
            mark_default: true,
            clear_forced: true,
            default_languages: BTreeMap::new(),
        }
    }
}

impl MixConfig {
    /// Fallback language for a kind, if one is configured.
    pub fn default_language(&self, kind: TrackKind) -> Option<&str> {
        self.default_languages
            .iter()
            .find(|(key, _)| key.parse::<TrackKind>().ok() == Some(kind))
            .map(|(_, lang)| lang.trim())
            .filter(|lang| !lang.is_empty())
    }
}
