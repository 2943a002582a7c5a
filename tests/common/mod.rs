//! Shared test harness for queue integration tests.
//!
//! [`FakeMuxer`] stands in for mkvmerge. Its behaviour is picked by the
//! output file name, so one queue can run succeeding, failing, hanging and
//! panicking jobs side by side:
//!
//! - `*fail*`  writes a zero-byte partial file, then exits with code 2
//! - `*empty*` "succeeds" without writing anything useful
//! - `*hang*`  never finishes until cancelled or timed out
//! - `*panic*` panics
//! - `*flaky*` fails until [`FakeMuxer::recover`] is called
//! - anything else writes a description of the request

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tm_av::{CancellationToken, MuxReport, MuxRequest, Muxer};
use tm_core::config::Config;
use tm_core::events::EventBus;
use tm_core::{Error, JobId};
use trackmix::{JobStatus, JobStore, MixJobRecord, MixQueue};

pub struct FakeMuxer {
    delay: Duration,
    calls: Mutex<Vec<MuxRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    recovered: AtomicBool,
}

impl FakeMuxer {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            recovered: AtomicBool::new(false),
        })
    }

    /// Every request received, in call order.
    pub fn calls(&self) -> Vec<MuxRequest> {
        self.calls.lock().clone()
    }

    /// Highest number of concurrent `mux` calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn recover(&self) {
        self.recovered.store(true, Ordering::SeqCst);
    }

    /// What a successful mux writes: one `source:id@lang` line per track.
    pub fn describe(request: &MuxRequest) -> String {
        request
            .tracks
            .iter()
            .map(|t| {
                format!(
                    "{}:{}@{}\n",
                    t.source.display(),
                    t.track_id,
                    t.language.as_deref().unwrap_or("-")
                )
            })
            .collect()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn mux(
        &self,
        request: &MuxRequest,
        cancel: &CancellationToken,
    ) -> tm_core::Result<MuxReport> {
        self.calls.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let name = request
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if name.contains("hang") {
            cancel.cancelled().await;
            return Err(Error::Cancelled {
                tool: "fake".into(),
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled { tool: "fake".into() });
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        if name.contains("panic") {
            panic!("fake muxer exploded");
        }
        if name.contains("fail") || (name.contains("flaky") && !self.recovered.load(Ordering::SeqCst)) {
            std::fs::write(&request.output, b"")?;
            return Err(Error::ToolExit {
                tool: "mkvmerge".into(),
                code: Some(2),
                message: "Error: the file could not be opened".into(),
            });
        }
        if name.contains("empty") {
            std::fs::write(&request.output, b"")?;
        } else {
            std::fs::write(&request.output, Self::describe(request))?;
        }

        Ok(MuxReport {
            output: request.output.clone(),
            tracks_written: request.tracks.len(),
            warnings: Vec::new(),
        })
    }
}

pub fn config(workers: usize, job_timeout_secs: u64) -> Config {
    let mut config = Config::default();
    config.queue.max_concurrent_mix_jobs = workers;
    config.queue.job_timeout_secs = job_timeout_secs;
    config
}

pub fn start(muxer: Arc<FakeMuxer>, config: &Config) -> MixQueue {
    let store = Arc::new(JobStore::new(
        config.queue.history_limit,
        Arc::new(EventBus::default()),
    ));
    MixQueue::start(config, store, muxer)
}

/// Wait for a job to settle, failing the test after a few seconds.
pub async fn settle(queue: &MixQueue, id: JobId) -> MixJobRecord {
    tokio::time::timeout(Duration::from_secs(10), queue.wait(id))
        .await
        .expect("job did not settle in time")
        .expect("job vanished")
}

pub async fn wait_for_status(queue: &MixQueue, id: JobId, status: JobStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while queue.get(id).unwrap().status != status {
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} never reached {status}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Names in a directory, hidden staging directories included.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub fn out(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}
