//! A composite prober that delegates to multiple [`Prober`] implementations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tm_core::{ProbeError, ProbedFile};

use super::Prober;

/// Tries each registered [`Prober`] in order.
///
/// The first prober whose [`Prober::supports`] matches is used. When it fails
/// with [`ProbeError::InspectionFailed`] the next supporting prober gets a
/// chance; a missing file or an unsupported container is final.
pub struct CompositeProber {
    probers: Vec<Arc<dyn Prober>>,
}

impl CompositeProber {
    /// Create a new `CompositeProber` from an ordered list of probers.
    pub fn new(probers: Vec<Arc<dyn Prober>>) -> Self {
        Self { probers }
    }

    /// Names of the registered probers, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.probers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl Prober for CompositeProber {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn supports(&self, path: &Path) -> bool {
        self.probers.iter().any(|p| p.supports(path))
    }

    async fn probe(&self, path: &Path) -> Result<ProbedFile, ProbeError> {
        let mut last_err = None;

        for prober in &self.probers {
            if !prober.supports(path) {
                continue;
            }

            match prober.probe(path).await {
                Ok(file) => return Ok(file),
                Err(e @ ProbeError::InspectionFailed(_)) => {
                    tracing::debug!(
                        prober = prober.name(),
                        error = %e,
                        "prober failed, trying next"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ProbeError::UnsupportedContainer(format!(
                "no prober supports file: {}",
                path.display()
            ))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        ext: &'static str,
        result: Result<usize, ProbeError>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, ext: &'static str, result: Result<usize, ProbeError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                ext,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Prober for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, path: &Path) -> bool {
            self.ext == "*" || path.extension().is_some_and(|e| e == self.ext)
        }

        async fn probe(&self, path: &Path) -> Result<ProbedFile, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let size = self.result.clone()?;
            Ok(ProbedFile {
                path: path.to_path_buf(),
                modified: None,
                container: Some(self.name.to_string()),
                size: Some(size as u64),
                tracks: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn first_supporting_prober_wins() {
        let mkv = Fixed::new("mkvmerge", "mkv", Ok(1));
        let any = Fixed::new("ffprobe", "*", Ok(2));
        let composite = CompositeProber::new(vec![mkv.clone() as Arc<dyn Prober>, any.clone()]);

        let file = composite.probe(Path::new("a.mkv")).await.unwrap();
        assert_eq!(file.container.as_deref(), Some("mkvmerge"));
        let file = composite.probe(Path::new("a.mp4")).await.unwrap();
        assert_eq!(file.container.as_deref(), Some("ffprobe"));
        assert_eq!(mkv.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inspection_failure_falls_through() {
        let mkv = Fixed::new(
            "mkvmerge",
            "mkv",
            Err(ProbeError::InspectionFailed("mkvmerge not found".into())),
        );
        let any = Fixed::new("ffprobe", "*", Ok(2));
        let composite = CompositeProber::new(vec![mkv as Arc<dyn Prober>, any]);

        let file = composite.probe(Path::new("a.mkv")).await.unwrap();
        assert_eq!(file.container.as_deref(), Some("ffprobe"));
    }

    #[tokio::test]
    async fn unsupported_container_is_final() {
        let mkv = Fixed::new(
            "mkvmerge",
            "mkv",
            Err(ProbeError::UnsupportedContainer("not matroska".into())),
        );
        let any = Fixed::new("ffprobe", "*", Ok(2));
        let composite = CompositeProber::new(vec![mkv as Arc<dyn Prober>, any.clone()]);

        let result = composite.probe(Path::new("a.mkv")).await;
        assert_matches!(result, Err(ProbeError::UnsupportedContainer(_)));
        assert_eq!(any.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_supporting_prober_is_unsupported() {
        let composite = CompositeProber::new(vec![Fixed::new("mkvmerge", "mkv", Ok(1)) as Arc<dyn Prober>]);
        assert!(!composite.supports(Path::new("README")));
        let result = composite.probe(Path::new("README")).await;
        assert_matches!(result, Err(ProbeError::UnsupportedContainer(_)));
    }

    #[tokio::test]
    async fn last_inspection_error_is_returned() {
        let ffprobe: Arc<dyn Prober> = Fixed::new(
            "ffprobe",
            "*",
            Err(ProbeError::InspectionFailed("exit 1".into())),
        );
        let composite = CompositeProber::new(vec![ffprobe]);
        let result = composite.probe(Path::new("a.mp4")).await;
        assert_eq!(result.unwrap_err(), ProbeError::InspectionFailed("exit 1".into()));
    }
}
