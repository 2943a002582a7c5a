//! Track probing.
//!
//! A [`Prober`] enumerates the tracks of a media file by shelling out to an
//! inspection tool and mapping its JSON report into a
//! [`tm_core::ProbedFile`]. Two backends exist:
//!
//! - [`MkvmergeProber`] (`mkvmerge -J`) for Matroska and WebM files.
//! - [`FfprobeProber`] (`ffprobe -show_streams`) for everything else.
//!
//! [`CompositeProber`] picks a backend by path, and [`CachedProber`]
//! memoizes results by `(path, mtime)`.

pub mod cache;
pub mod composite;
pub mod ffprobe;
pub mod mkvmerge;

pub use cache::CachedProber;
pub use composite::CompositeProber;
pub use ffprobe::FfprobeProber;
pub use mkvmerge::MkvmergeProber;

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use tm_core::{ProbeError, ProbedFile, TrackKind};

/// A media file prober capable of listing the tracks inside a container.
///
/// Implementations must be safe to share across threads (`Send + Sync`);
/// probing distinct files concurrently is always allowed.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Check whether this prober supports the given file path.
    ///
    /// Typically checks the file extension. A return value of `true` does not
    /// guarantee that [`Prober::probe`] will succeed.
    fn supports(&self, path: &Path) -> bool;

    /// Probe a media file and return every video, audio and subtitle track
    /// in container order.
    async fn probe(&self, path: &Path) -> Result<ProbedFile, ProbeError>;
}

/// Probe a file and keep only the tracks of one kind.
pub async fn probe_kind(
    prober: &dyn Prober,
    path: &Path,
    kind: TrackKind,
) -> Result<ProbedFile, ProbeError> {
    let file = prober.probe(path).await?;
    Ok(file.of_kind(kind))
}

/// Size and modification time of a file about to be probed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Stat `path`, rejecting anything that is not an existing regular file.
pub(crate) async fn stat_file(path: &Path) -> Result<FileStat, ProbeError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(FileStat {
            size: meta.len(),
            modified: meta.modified().ok(),
        }),
        Ok(_) => Err(ProbeError::FileNotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ProbeError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => Err(ProbeError::InspectionFailed(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

/// Lowercased extension of `path`, if any.
pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Join the non-empty parts with a space, `None` when nothing is left.
pub(crate) fn join_parts(parts: Vec<String>) -> Option<String> {
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Trimmed, non-empty copy of an optional string.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
