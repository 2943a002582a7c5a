// Re-export all probe functionality from tm-av
pub use tm_av::probe::*;

use std::path::PathBuf;
use std::sync::Arc;

use tm_av::ToolRegistry;
use tm_core::config::Config;
use tm_core::{ProbeError, ProbedFile};
use tokio::task::JoinSet;

/// Assemble the prober for the discovered tools.
///
/// mkvmerge handles Matroska-family files when it is installed; ffprobe
/// handles everything else and is the fallback when mkvmerge cannot read a
/// file. When ffprobe was not discovered it is still invoked by name so that
/// probing reports the missing tool as an inspection failure.
pub fn build_prober(config: &Config, tools: &ToolRegistry) -> Arc<dyn Prober> {
    let mut backends: Vec<Arc<dyn Prober>> = Vec::new();

    if let Ok(mkvmerge) = tools.require("mkvmerge") {
        backends.push(Arc::new(MkvmergeProber::new(mkvmerge.clone())));
    }
    match tools.require("ffprobe") {
        Ok(ffprobe) => backends.push(Arc::new(FfprobeProber::new(ffprobe.clone()))),
        Err(_) => {
            tracing::warn!("ffprobe not found; probing non-Matroska files will fail");
            backends.push(Arc::new(FfprobeProber::with_path(PathBuf::from("ffprobe"))));
        }
    }

    let composite: Arc<dyn Prober> = Arc::new(CompositeProber::new(backends));
    if config.probe.cache {
        Arc::new(CachedProber::new(composite))
    } else {
        composite
    }
}

/// Probe several files concurrently. Results come back in input order.
pub async fn probe_all(
    prober: Arc<dyn Prober>,
    paths: Vec<PathBuf>,
) -> Vec<(PathBuf, Result<ProbedFile, ProbeError>)> {
    let mut set = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        let prober = prober.clone();
        set.spawn(async move {
            let result = prober.probe(&path).await;
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<ProbedFile, ProbeError>>> = vec![None; paths.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => tracing::error!("Probe task failed: {}", e),
        }
    }

    paths
        .into_iter()
        .zip(results)
        .map(|(path, result)| {
            let result = result.unwrap_or_else(|| {
                Err(ProbeError::InspectionFailed(format!(
                    "probe of {} did not complete",
                    path.display()
                )))
            });
            (path, result)
        })
        .collect()
}
