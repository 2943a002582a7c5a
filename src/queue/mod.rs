//! Mix queue: a FIFO of validated jobs drained by a bounded pool of workers.
//!
//! [`MixQueue::submit`] validates a request, records a queued job in the
//! [`JobStore`] and returns its id without waiting for execution. Workers
//! claim jobs strictly in submission order; each claim is the store's
//! `queued -> running` transition, so a job is never run twice and a job
//! cancelled while queued is skipped.

mod executor;
mod validate;

pub use validate::{validate, MixRequest, OUTPUT_EXTENSIONS};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tm_av::Muxer;
use tm_core::config::{Config, MixConfig};
use tm_core::{JobId, MixExecutionError, SubmissionError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::{JobStatus, JobStore, MixJob, MixJobRecord, StoreError};
use executor::Staged;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} is already {status}")]
    NotCancellable { id: JobId, status: JobStatus },

    #[error("job {id} is {status}; only failed or cancelled jobs can be resubmitted")]
    NotResubmittable { id: JobId, status: JobStatus },

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

pub struct MixQueue {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    store: Arc<JobStore>,
    muxer: Arc<dyn Muxer>,
    mix: Arc<MixConfig>,
    job_timeout: Option<Duration>,
    pending: Mutex<VecDeque<JobId>>,
    wake: Notify,
    /// Cancellation handles of running jobs.
    active: Mutex<HashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl MixQueue {
    /// Spawn `queue.max_concurrent_mix_jobs` workers on the current runtime.
    pub fn start(config: &Config, store: Arc<JobStore>, muxer: Arc<dyn Muxer>) -> Self {
        let worker_count = config.queue.max_concurrent_mix_jobs.max(1);
        let inner = Arc::new(Inner {
            store,
            muxer,
            mix: Arc::new(config.mix.clone()),
            job_timeout: config.queue.job_timeout(),
            pending: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            active: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        let workers = (0..worker_count)
            .map(|worker| tokio::spawn(worker_loop(inner.clone(), worker)))
            .collect();

        tracing::info!(
            workers = worker_count,
            muxer = inner.muxer.name(),
            timeout_secs = inner.job_timeout.map(|d| d.as_secs()),
            "Mix queue started"
        );

        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Validate a request and queue it.
    pub fn submit(&self, request: MixRequest) -> Result<JobId, SubmissionError> {
        let (output_path, inputs) = validate(request)?;

        let id = {
            // Holding the FIFO lock across id allocation keeps queue order
            // equal to id order.
            let mut pending = self.inner.pending.lock();
            let id = self.inner.store.create(output_path, inputs).id();
            pending.push_back(id);
            id
        };
        self.inner.wake.notify_one();

        if self.inner.shutdown.is_cancelled() {
            tracing::warn!(job_id = %id, "Mix queue is shut down; job will stay queued");
        } else {
            tracing::info!(job_id = %id, "Mix job submitted");
        }
        Ok(id)
    }

    /// Queue a fresh copy of a failed or cancelled job under a new id.
    pub fn resubmit(&self, id: JobId) -> Result<JobId, QueueError> {
        let record = self
            .inner
            .store
            .get(id)
            .map_err(|_| QueueError::NotFound(id))?;
        if !matches!(record.status, JobStatus::Failed | JobStatus::Cancelled) {
            return Err(QueueError::NotResubmittable {
                id,
                status: record.status,
            });
        }

        let MixJob {
            output_path,
            inputs,
            ..
        } = record.job;
        let new_id = self.submit(MixRequest::new(output_path, inputs))?;
        tracing::info!(job_id = %new_id, previous = %id, "Mix job resubmitted");
        Ok(new_id)
    }

    /// Cancel a queued or running job.
    ///
    /// A running job is marked cancelled at once; its worker then kills the
    /// tool and removes the staged output.
    pub fn cancel(&self, id: JobId) -> Result<(), QueueError> {
        let active = self.inner.active.lock();

        if let Some(token) = active.get(&id) {
            token.cancel();
            self.inner
                .store
                .mark_cancelled(id)
                .map_err(|e| store_to_cancel_error(id, e))?;
            tracing::info!(job_id = %id, "Cancelling running mix job");
            return Ok(());
        }

        self.inner
            .store
            .mark_cancelled(id)
            .map_err(|e| store_to_cancel_error(id, e))?;
        self.inner.pending.lock().retain(|queued| *queued != id);
        tracing::info!(job_id = %id, "Cancelled queued mix job");
        Ok(())
    }

    /// Wait until a job is terminal and its worker has finished cleaning up.
    pub async fn wait(&self, id: JobId) -> tm_core::Result<MixJobRecord> {
        let mut events = self.inner.store.events().subscribe();
        loop {
            let record = self.inner.store.get(id)?;
            let busy = self.inner.active.lock().contains_key(&id);
            if record.status.is_terminal() && !busy {
                return Ok(record);
            }

            tokio::select! {
                _ = events.recv() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }

    /// Stop the workers. Running jobs are cancelled; queued jobs stay queued.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::warn!("Mix worker ended abnormally: {}", e);
            }
        }
        tracing::info!("Mix queue stopped");
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    pub fn get(&self, id: JobId) -> tm_core::Result<MixJobRecord> {
        self.inner.store.get(id)
    }

    pub fn list(&self) -> Vec<MixJobRecord> {
        self.inner.store.list()
    }

    /// Number of jobs waiting for a worker.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Number of jobs currently held by a worker.
    pub fn running_len(&self) -> usize {
        self.inner.active.lock().len()
    }
}

impl Drop for MixQueue {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl std::fmt::Debug for MixQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixQueue")
            .field("muxer", &self.inner.muxer.name())
            .field("pending", &self.pending_len())
            .field("running", &self.running_len())
            .finish()
    }
}

fn store_to_cancel_error(id: JobId, err: StoreError) -> QueueError {
    match err {
        StoreError::NotFound(id) => QueueError::NotFound(id),
        StoreError::Transition(e) => QueueError::NotCancellable { id, status: e.from },
    }
}

async fn worker_loop(inner: Arc<Inner>, worker: usize) {
    tracing::debug!(worker, "Mix worker started");
    while let Some(id) = inner.next_job().await {
        inner.process(id, worker).await;
    }
    tracing::debug!(worker, "Mix worker stopped");
}

impl Inner {
    async fn next_job(&self) -> Option<JobId> {
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }
            let next = self.pending.lock().pop_front();
            if next.is_some() {
                return next;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                _ = self.wake.notified() => {}
            }
        }
    }

    async fn process(&self, id: JobId, worker: usize) {
        let token = self.shutdown.child_token();
        let Some(job) = self.claim(id, &token) else {
            return;
        };

        tracing::info!(
            job_id = %id,
            worker,
            output = %job.output_path.display(),
            tracks = job.track_count(),
            "Mix job started"
        );

        let handle = tokio::spawn(executor::run(
            job,
            self.muxer.clone(),
            self.mix.clone(),
            self.job_timeout,
            token.clone(),
        ));
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                tracing::error!(job_id = %id, "Mix job panicked");
                Err(MixExecutionError::Internal("mix job panicked".into()))
            }
            Err(e) => Err(MixExecutionError::Internal(format!("mix job aborted: {e}"))),
        };

        self.complete(id, &token, outcome);
    }

    /// Move a queued job to running and register its cancellation handle.
    fn claim(&self, id: JobId, token: &CancellationToken) -> Option<MixJob> {
        let mut active = self.active.lock();
        match self.store.mark_running(id) {
            Ok(record) => {
                active.insert(id, token.clone());
                Some(record.job)
            }
            Err(e) => {
                tracing::debug!(job_id = %id, error = %e, "Skipping job");
                None
            }
        }
    }

    /// Record the outcome. Runs under the active-jobs lock so a concurrent
    /// cancel either happens entirely before or entirely after it.
    fn complete(&self, id: JobId, token: &CancellationToken, outcome: Result<Staged, MixExecutionError>) {
        let mut active = self.active.lock();
        active.remove(&id);

        if token.is_cancelled() {
            if let Ok(staged) = outcome {
                staged.workspace.discard();
            }
            // Already cancelled when the request came through `cancel`.
            if self.store.mark_cancelled(id).is_ok() {
                tracing::info!(job_id = %id, "Mix job cancelled by shutdown");
            }
            return;
        }

        let outcome = outcome.and_then(|staged| {
            let written = staged.report.tracks_written;
            staged
                .workspace
                .finalize()
                .map(|path| (written, path))
                .map_err(MixExecutionError::from)
        });

        let recorded = match outcome {
            Ok((written, path)) => {
                let message = format!("wrote {} tracks to {}", written, path.display());
                tracing::info!(job_id = %id, "{}", message);
                self.store.mark_success(id, message)
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Mix job failed");
                self.store.mark_failed(id, e.to_string())
            }
        };
        if let Err(e) = recorded {
            tracing::error!(job_id = %id, error = %e, "Failed to record job outcome");
        }
    }
}
