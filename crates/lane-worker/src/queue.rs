//! Job admission queue.
//!
//! Any number of producers submit jobs through a cloneable [`JobQueue`]; a
//! single background thread consumes them strictly in submission order.
//! Only that thread touches the toolchain and writes to the cache, so at
//! most one toolchain process runs at a time and no cache locking is needed.
//!
//! Per job the consumer:
//! 1. Serves a cache hit immediately
//! 2. Checks the cancellation token once, answering `aborted` if it fired
//! 3. Otherwise runs the toolchain
//! 4. Counts the job and, when due, runs an eviction pass before the next job
//!
//! Every submitted job receives exactly one [`JobOutcome`].

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lane_protocol::{JobOutcome, JobRequest};

use crate::cache::ArtifactCache;
use crate::cancel::CancelToken;
use crate::config::WorkerConfig;
use crate::invoker::Toolchain;
use crate::scheduler::EvictionScheduler;

const WORKER_UNAVAILABLE: &str = "build worker unavailable";

/// One-shot delivery slot for a job's outcome.
///
/// `complete` consumes the slot, so a job can never be answered twice. A slot
/// dropped without an answer (for example while a panic unwinds the worker)
/// answers `aborted`, so a waiting producer is never left hanging.
#[derive(Debug)]
pub struct Completion {
    sender: Option<SyncSender<JobOutcome>>,
}

impl Completion {
    fn channel() -> (Self, Receiver<JobOutcome>) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (Self { sender: Some(sender) }, receiver)
    }

    /// Deliver the terminal outcome.
    pub fn complete(mut self, outcome: JobOutcome) {
        if let Some(sender) = self.sender.take() {
            // The producer may have given up; that's fine.
            let _ = sender.send(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(JobOutcome::aborted());
        }
    }
}

/// Producer's view of a submitted job.
///
/// The handle stands for the originating request: dropping it cancels the
/// job, so an abandoned job never holds the toolchain.
#[derive(Debug)]
pub struct JobHandle {
    receiver: Receiver<JobOutcome>,
    cancel: CancelToken,
}

impl JobHandle {
    /// Request cancellation of the job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block until the job's outcome arrives.
    pub fn wait(self) -> JobOutcome {
        self.receiver
            .recv()
            .unwrap_or_else(|_| JobOutcome::failed(WORKER_UNAVAILABLE))
    }

    /// Wait up to `timeout`; `None` if the job is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(JobOutcome::failed(WORKER_UNAVAILABLE)),
        }
    }

    /// Non-blocking check for the outcome.
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(JobOutcome::failed(WORKER_UNAVAILABLE)),
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Counters maintained by the worker thread.
#[derive(Debug, Default)]
pub struct WorkerStats {
    jobs: AtomicU64,
    cache_hits: AtomicU64,
    aborted_before_start: AtomicU64,
    toolchain_runs: AtomicU64,
    eviction_passes: AtomicU64,
}

impl WorkerStats {
    pub fn jobs(&self) -> u64 {
        self.jobs.load(Ordering::SeqCst)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::SeqCst)
    }

    pub fn aborted_before_start(&self) -> u64 {
        self.aborted_before_start.load(Ordering::SeqCst)
    }

    pub fn toolchain_runs(&self) -> u64 {
        self.toolchain_runs.load(Ordering::SeqCst)
    }

    pub fn eviction_passes(&self) -> u64 {
        self.eviction_passes.load(Ordering::SeqCst)
    }
}

struct QueuedJob {
    request: JobRequest,
    cancel: CancelToken,
    completion: Completion,
}

/// Submission side of the admission queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    sender: Sender<QueuedJob>,
    stats: Arc<WorkerStats>,
}

impl JobQueue {
    /// Enqueue a job with a fresh cancellation token.
    pub fn submit(&self, request: JobRequest) -> JobHandle {
        self.submit_with_cancel(request, CancelToken::new())
    }

    /// Enqueue a job observing an existing cancellation token.
    ///
    /// Never blocks beyond the channel hand-off.
    pub fn submit_with_cancel(&self, request: JobRequest, cancel: CancelToken) -> JobHandle {
        let (completion, receiver) = Completion::channel();
        let job = QueuedJob {
            request,
            cancel: cancel.clone(),
            completion,
        };

        if let Err(mpsc::SendError(job)) = self.sender.send(job) {
            tracing::error!("build worker is gone, rejecting job");
            job.completion.complete(JobOutcome::failed(WORKER_UNAVAILABLE));
        }

        JobHandle { receiver, cancel }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }
}

/// The single consumer of the admission queue.
pub struct BuildWorker<C, T> {
    cache: C,
    toolchain: T,
    scheduler: EvictionScheduler,
    stats: Arc<WorkerStats>,
}

impl<C, T> BuildWorker<C, T>
where
    C: ArtifactCache + 'static,
    T: Toolchain + 'static,
{
    pub fn new(cache: C, toolchain: T, config: &WorkerConfig) -> Self {
        Self {
            cache,
            toolchain,
            scheduler: EvictionScheduler::new(config.evict_every),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Start the consumer thread.
    ///
    /// The thread runs until every clone of the returned [`JobQueue`] has been
    /// dropped and the remaining jobs are drained.
    pub fn spawn(self) -> io::Result<(JobQueue, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::channel();
        let queue = JobQueue {
            sender,
            stats: Arc::clone(&self.stats),
        };
        let handle = thread::Builder::new()
            .name("build-worker".to_string())
            .spawn(move || self.run(receiver))?;
        Ok((queue, handle))
    }

    fn run(mut self, jobs: Receiver<QueuedJob>) {
        tracing::info!(evict_every = self.scheduler.every(), "build worker started");
        for job in jobs {
            self.process(job);
        }
        tracing::info!(jobs = self.stats.jobs(), "build worker stopped");
    }

    fn process(&mut self, job: QueuedJob) {
        let QueuedJob {
            request,
            cancel,
            completion,
        } = job;

        let outcome = self.execute(&request, &cancel);
        completion.complete(outcome);
        self.stats.jobs.fetch_add(1, Ordering::SeqCst);

        if self.scheduler.record_job() && self.scheduler.run_pass(&self.cache).is_some() {
            self.stats.eviction_passes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn execute(&self, request: &JobRequest, cancel: &CancelToken) -> JobOutcome {
        let key = request.key();

        if let Some(path) = self.cache.lookup(&key) {
            tracing::debug!(artifact = %path.display(), "cache hit");
            self.stats.cache_hits.fetch_add(1, Ordering::SeqCst);
            return JobOutcome::Built(path);
        }

        if cancel.is_cancelled() {
            tracing::debug!(board = %request.target, digest = %request.digest, "job cancelled before start");
            self.stats.aborted_before_start.fetch_add(1, Ordering::SeqCst);
            return JobOutcome::aborted();
        }

        self.stats.toolchain_runs.fetch_add(1, Ordering::SeqCst);
        self.toolchain.compile(request, cancel, &self.cache)
    }
}
