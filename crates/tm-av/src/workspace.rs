//! Output staging for mix jobs.
//!
//! A [`Workspace`] owns a hidden temporary directory next to the final
//! destination. The muxer writes into [`Workspace::staged`]; only
//! [`Workspace::finalize`] moves the result to the destination. Dropping or
//! discarding the workspace removes everything staged, so a failed or
//! cancelled job never leaves a file at the destination and never touches a
//! file already there.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tm_core::{Error, MixExecutionError};

/// Staging area for one output file.
///
/// # Example
///
/// ```no_run
/// use tm_av::Workspace;
///
/// let workspace = Workspace::for_output(std::path::Path::new("/media/out/ep01.mkv")).unwrap();
/// // ... mux into workspace.staged() ...
/// workspace.finalize().unwrap();
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
    destination: PathBuf,
}

impl Workspace {
    /// Create a staging directory in the destination's parent directory.
    ///
    /// Staging on the same filesystem keeps [`Workspace::finalize`] a rename.
    /// The parent directory must already exist.
    pub fn for_output(destination: &Path) -> tm_core::Result<Self> {
        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp_dir = tempfile::Builder::new()
            .prefix(".trackmix-")
            .tempdir_in(&parent)
            .map_err(|e| {
                Error::Mix(MixExecutionError::Io(format!(
                    "failed to create staging dir in {}: {e}",
                    parent.display()
                )))
            })?;

        Ok(Self {
            temp_dir,
            destination: destination.to_path_buf(),
        })
    }

    /// Final location of the output.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Where the muxer should write (same file name as the destination,
    /// inside the staging dir).
    pub fn staged(&self) -> PathBuf {
        let file_name = self
            .destination
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("output.mkv"));
        self.temp_dir.path().join(file_name)
    }

    /// Path to the staging directory.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Verify the staged output and move it to the destination.
    ///
    /// # Errors
    ///
    /// - [`MixExecutionError::OutputMissing`] if nothing was staged.
    /// - [`MixExecutionError::OutputEmpty`] if the staged file has zero size.
    /// - [`MixExecutionError::Io`] if the move fails.
    ///
    /// On error the staged output is discarded and the destination is left
    /// untouched.
    pub fn finalize(self) -> tm_core::Result<PathBuf> {
        let staged = self.staged();

        let len = match std::fs::metadata(&staged) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                let dest = self.destination.clone();
                self.discard();
                return Err(MixExecutionError::OutputMissing(dest).into());
            }
        };
        if len == 0 {
            let dest = self.destination.clone();
            self.discard();
            return Err(MixExecutionError::OutputEmpty(dest).into());
        }

        // Staging shares the destination's directory, so this is an atomic
        // replace; a failed rename leaves any existing destination as it was.
        if let Err(e) = std::fs::rename(&staged, &self.destination) {
            let dest = self.destination.clone();
            self.discard();
            return Err(MixExecutionError::Io(format!(
                "failed to move output to {}: {e}",
                dest.display()
            ))
            .into());
        }

        let dest = self.destination.clone();
        self.discard();
        Ok(dest)
    }

    /// Remove the staging directory and anything in it.
    ///
    /// Cleanup is best-effort: a failure is logged, never returned.
    pub fn discard(self) {
        let dir = self.temp_dir.path().to_path_buf();
        if let Err(e) = self.temp_dir.close() {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove staged output");
        }
    }
}
