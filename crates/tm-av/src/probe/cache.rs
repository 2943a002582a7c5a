//! Memoizing prober keyed by `(path, mtime)`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use tm_core::{ProbeError, ProbedFile};

use super::{stat_file, Prober};

/// Wraps another [`Prober`] and reuses its result while the file's
/// modification time is unchanged.
///
/// A file without a readable mtime is never cached. Errors are never cached.
pub struct CachedProber {
    inner: Arc<dyn Prober>,
    entries: Mutex<HashMap<PathBuf, (SystemTime, ProbedFile)>>,
}

impl CachedProber {
    pub fn new(inner: Arc<dyn Prober>) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[async_trait]
impl Prober for CachedProber {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn supports(&self, path: &Path) -> bool {
        self.inner.supports(path)
    }

    async fn probe(&self, path: &Path) -> Result<ProbedFile, ProbeError> {
        let stat = stat_file(path).await?;

        let hit = stat.modified.and_then(|mtime| {
            let entries = self.entries.lock();
            entries
                .get(path)
                .filter(|(cached_mtime, _)| *cached_mtime == mtime)
                .map(|(_, file)| file.clone())
        });
        if let Some(file) = hit {
            tracing::trace!(path = %path.display(), "probe cache hit");
            return Ok(file);
        }

        let file = self.inner.probe(path).await?;
        match stat.modified {
            Some(mtime) => {
                self.entries
                    .lock()
                    .insert(path.to_path_buf(), (mtime, file.clone()));
            }
            None => {
                self.entries.lock().remove(path);
            }
        }
        Ok(file)
    }
}
