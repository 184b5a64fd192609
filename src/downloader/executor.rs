//! Download executor with throttling, retry, and resume
//!
//! Drains a task queue with a fixed worker pool. Each worker acquires a
//! throttle permit, streams the body into a temp file next to the
//! destination, verifies it, and renames it into place. A file is either
//! absent or complete at its destination; partial data only ever lives in
//! the temp file.

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::downloader::config::DownloadConfig;
use crate::downloader::job::{DownloadTask, SkipReason, TaskIdentity, TaskOutcome, TaskResult};
use crate::downloader::pool::WorkerPool;
use crate::downloader::progress::{ProgressObserver, RunState};
use crate::downloader::throttle::{Throttle, ThrottlePermit};
use crate::fetcher::retry_formatter::RetryContext;
use crate::fetcher::{Credentials, FetchError, FetchResult, RemoteBody, Transport};
use crate::metrics::{self, TransferMetrics};
use crate::resume::{Deduplicator, FetchRecord, Verification};
use crate::shutdown::{self, SharedShutdown, ShutdownCoordinator};

/// Runs download tasks against a [`Transport`]
pub struct DownloadExecutor {
    transport: Arc<dyn Transport>,
    config: Arc<DownloadConfig>,
    dedup: Arc<Deduplicator>,
    shutdown: Option<SharedShutdown>,
}

impl std::fmt::Debug for DownloadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadExecutor")
            .field("config", &self.config)
            .field("recorded", &self.dedup.len())
            .finish_non_exhaustive()
    }
}

impl DownloadExecutor {
    /// Executor with an empty deduplicator and the global shutdown handle
    pub fn new(transport: Arc<dyn Transport>, config: DownloadConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
            dedup: Arc::new(Deduplicator::new()),
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Use a deduplicator seeded from a ledger
    pub fn with_deduplicator(mut self, dedup: Arc<Deduplicator>) -> Self {
        self.dedup = dedup;
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Fetched identities known to this executor
    pub fn deduplicator(&self) -> &Arc<Deduplicator> {
        &self.dedup
    }

    /// Active configuration
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Run every task and return one result per task, in input order
    ///
    /// An authentication failure stops all workers from pulling further
    /// tasks; tasks that never started are reported as failed with the same
    /// cause. A cancellation request does the same but reports them skipped.
    pub async fn run(
        &self,
        tasks: Vec<DownloadTask>,
        credentials: &Credentials,
        observer: Arc<dyn ProgressObserver>,
    ) -> Vec<TaskResult> {
        let total = tasks.len();
        let span = info_span!("download_run", tasks = total, workers = self.config.max_workers);

        async move {
            info!("Starting download run");
            let ctx = Arc::new(WorkerContext {
                transport: self.transport.clone(),
                config: self.config.clone(),
                dedup: self.dedup.clone(),
                throttle: Throttle::new(self.config.max_workers, self.config.delay),
                state: RunState::new(total),
                observer: observer.clone(),
                credentials: credentials.clone(),
                shutdown: self.shutdown.clone(),
                abort: ShutdownCoordinator::shared(),
                abort_cause: Mutex::new(None),
            });

            let ticker = self.spawn_snapshot_ticker(&ctx);

            let mut pool = WorkerPool::new(self.config.max_workers).with_stop_signal(ctx.abort.clone());
            if let Some(shutdown) = &self.shutdown {
                pool = pool.with_stop_signal(shutdown.clone());
            }

            let originals = tasks.clone();
            let handler_ctx = ctx.clone();
            let output = pool
                .run(tasks, move |worker, task| {
                    let ctx = handler_ctx.clone();
                    async move { ctx.process(worker, task).await }
                })
                .await;

            let mut slots: Vec<Option<TaskResult>> = (0..total).map(|_| None).collect();
            for (index, result) in output.completed {
                slots[index] = Some(result);
            }
            for (index, task) in output.not_started {
                let outcome = ctx.stopped_outcome();
                slots[index] = Some(ctx.settle_unadmitted(task, outcome, 0, Instant::now()));
            }
            for index in output.lost {
                error!(task = %originals[index].label(), "Worker panicked while processing task");
                let outcome = TaskOutcome::Failed(FetchError::Internal("worker panicked".to_string()));
                slots[index] = Some(ctx.settle_unadmitted(
                    originals[index].clone(),
                    outcome,
                    0,
                    Instant::now(),
                ));
            }

            if let Some(stop) = ticker {
                let _ = stop.send(());
            }
            let snapshot = ctx.state.snapshot();
            observer.on_snapshot(&snapshot);
            info!(
                downloaded = snapshot.done,
                skipped = snapshot.skipped,
                failed = snapshot.failed,
                bytes = snapshot.bytes_written,
                elapsed_ms = snapshot.elapsed.as_millis() as u64,
                "Download run finished"
            );

            slots.into_iter().flatten().collect()
        }
        .instrument(span)
        .await
    }

    fn spawn_snapshot_ticker(
        &self,
        ctx: &Arc<WorkerContext>,
    ) -> Option<tokio::sync::oneshot::Sender<()>> {
        let period = self.config.snapshot_interval?;
        if period.is_zero() {
            return None;
        }
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => ctx.observer.on_snapshot(&ctx.state.snapshot()),
                    _ = &mut stop_rx => break,
                }
            }
        });
        Some(stop_tx)
    }
}

/// State shared by every worker of one run
struct WorkerContext {
    transport: Arc<dyn Transport>,
    config: Arc<DownloadConfig>,
    dedup: Arc<Deduplicator>,
    throttle: Throttle,
    state: RunState,
    observer: Arc<dyn ProgressObserver>,
    credentials: Credentials,
    shutdown: Option<SharedShutdown>,
    abort: SharedShutdown,
    abort_cause: Mutex<Option<FetchError>>,
}

/// A file that reached its destination
struct StagedFile {
    bytes: u64,
    sha256: Option<String>,
}

impl WorkerContext {
    fn cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    fn abort_cause(&self) -> Option<FetchError> {
        self.abort_cause
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn trigger_abort(&self, cause: FetchError) {
        let mut slot = self.abort_cause.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            error!(error = %cause, "Authentication rejected, aborting run");
            *slot = Some(cause);
        }
        drop(slot);
        self.abort.request_shutdown();
    }

    /// Outcome for a task stopped by abort or cancellation
    fn stopped_outcome(&self) -> TaskOutcome {
        match self.abort_cause() {
            Some(cause) => TaskOutcome::Failed(cause),
            None => TaskOutcome::Skipped(SkipReason::Cancelled),
        }
    }

    async fn wait_for_stop(&self) {
        let user = async {
            match &self.shutdown {
                Some(shutdown) => shutdown.wait_for_shutdown().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = self.abort.wait_for_shutdown() => {},
            _ = user => {},
        }
    }

    fn emit(&self, result: TaskResult) -> TaskResult {
        let label = match &result.outcome {
            TaskOutcome::Success { .. } => "success",
            TaskOutcome::Skipped(_) => "skipped",
            TaskOutcome::Failed(_) => "failed",
        };
        metrics::record_task_outcome(result.task.module.as_str(), label);
        self.observer.on_task_result(&result);
        result
    }

    /// Settle a task that never entered the in-flight set
    fn settle_unadmitted(
        &self,
        task: DownloadTask,
        outcome: TaskOutcome,
        attempts: u32,
        started: Instant,
    ) -> TaskResult {
        self.state.record(&outcome);
        self.emit(TaskResult::new(task, outcome, attempts, started.elapsed()))
    }

    async fn process(&self, worker: usize, task: DownloadTask) -> TaskResult {
        let span = info_span!(
            "download_task",
            module = %task.module,
            date_key = %task.date_key,
            worker
        );
        self.process_inner(worker, task).instrument(span).await
    }

    async fn process_inner(&self, worker: usize, task: DownloadTask) -> TaskResult {
        let started = Instant::now();
        let identity = task.identity();

        if self.abort_cause().is_some() || self.cancelled() {
            let outcome = self.stopped_outcome();
            return self.settle_unadmitted(task, outcome, 0, started);
        }

        if !self.config.force {
            if let Some(record) = self.dedup.record(&identity) {
                match record.verify(&task.destination, self.config.verify_hash) {
                    Verification::Valid => {
                        debug!("Ledger record verified, skipping");
                        let outcome = TaskOutcome::Skipped(SkipReason::AlreadyFetched);
                        return self.settle_unadmitted(task, outcome, 0, started);
                    }
                    verification => {
                        warn!(
                            path = %task.destination.display(),
                            verification = ?verification,
                            "Recorded file failed verification, fetching again"
                        );
                        self.dedup.forget(&identity);
                    }
                }
            }
        }

        if !self.state.try_begin(&identity) {
            debug!("Identity already in flight on another worker");
            let outcome = TaskOutcome::Skipped(SkipReason::DuplicateInFlight);
            return self.settle_unadmitted(task, outcome, 0, started);
        }

        let (outcome, attempts) = self.fetch_with_retry(worker, &task, &identity).await;
        self.state.finish(&identity, &outcome);
        self.emit(TaskResult::new(task, outcome, attempts, started.elapsed()))
    }

    async fn fetch_with_retry(
        &self,
        worker: usize,
        task: &DownloadTask,
        identity: &TaskIdentity,
    ) -> (TaskOutcome, u32) {
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0;
        let mut last_error: Option<FetchError> = None;

        loop {
            if self.abort_cause().is_some() || self.cancelled() {
                return (self.stopped_outcome(), attempt);
            }
            attempt += 1;

            let permit = tokio::select! {
                permit = self.throttle.acquire(worker) => match permit {
                    Ok(permit) => permit,
                    Err(e) => return (TaskOutcome::Failed(FetchError::Internal(e.to_string())), attempt),
                },
                _ = self.wait_for_stop() => return (self.stopped_outcome(), attempt - 1),
            };

            // Auth may have failed elsewhere while this worker waited for spacing
            if let Some(cause) = self.abort_cause() {
                self.throttle.release(permit);
                return (TaskOutcome::Failed(cause), attempt - 1);
            }

            let error = match self.attempt(task, identity, attempt, permit).await {
                Ok(outcome) => {
                    if let Some(previous) = &last_error {
                        let ctx = RetryContext::new(
                            attempt,
                            max_attempts,
                            previous,
                            Duration::ZERO,
                            task.label(),
                        );
                        info!("{}", ctx.format_success());
                    }
                    return (outcome, attempt);
                }
                Err(error) => error,
            };

            if error.is_auth() {
                self.trigger_abort(error.clone());
                let ctx = RetryContext::new(attempt, max_attempts, &error, Duration::ZERO, task.label());
                error!("{}", ctx.format_failure());
                return (TaskOutcome::Failed(error), attempt);
            }
            if error == FetchError::Cancelled {
                info!("Transfer cancelled mid-stream, temp file discarded");
                return (self.stopped_outcome(), attempt);
            }
            if !error.is_retryable() || attempt >= max_attempts {
                let ctx = RetryContext::new(attempt, max_attempts, &error, Duration::ZERO, task.label());
                error!("{}", ctx.format_failure());
                return (TaskOutcome::Failed(error), attempt);
            }

            let backoff = self.config.backoff_for(attempt - 1, &error);
            let ctx = RetryContext::new(attempt + 1, max_attempts, &error, backoff, task.label());
            warn!(error = %error, "{}", ctx.format_retry());
            metrics::record_retry_backoff(backoff, attempt + 1);

            last_error = Some(error);

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {},
                _ = self.wait_for_stop() => return (self.stopped_outcome(), attempt),
            }
        }
    }

    /// One attempt while holding `permit`; the permit is released on every path
    async fn attempt(
        &self,
        task: &DownloadTask,
        identity: &TaskIdentity,
        attempt: u32,
        permit: ThrottlePermit,
    ) -> FetchResult<TaskOutcome> {
        let transfer_metrics = TransferMetrics::start(task.module.as_str(), attempt);

        if !self.config.force && !self.config.direct_download && task.destination.is_file() {
            match self.probe_existing(task, identity).await {
                Ok(true) => {
                    self.throttle.release(permit);
                    return Ok(TaskOutcome::Skipped(SkipReason::VerifiedExisting));
                }
                Ok(false) => {}
                Err(e) => {
                    transfer_metrics.record_error(&e);
                    self.throttle.release(permit);
                    return Err(e);
                }
            }
        }

        let result = self.transfer(task).await;

        let outcome = match result {
            Ok(staged) => {
                transfer_metrics.record_success(staged.bytes);
                self.dedup.mark_fetched(FetchRecord::new(
                    identity.clone(),
                    &task.destination,
                    staged.bytes,
                    staged.sha256,
                ));
                Ok(TaskOutcome::Success {
                    bytes_written: staged.bytes,
                    local_path: task.destination.clone(),
                })
            }
            Err(e) => {
                transfer_metrics.record_error(&e);
                Err(e)
            }
        };
        self.throttle.release(permit);
        outcome
    }

    /// Whether an unrecorded staged file matches the server's advertised size
    ///
    /// Only authentication errors propagate; any other probe failure falls
    /// through to a full download.
    async fn probe_existing(&self, task: &DownloadTask, identity: &TaskIdentity) -> FetchResult<bool> {
        let probe = tokio::time::timeout(
            self.config.request_timeout,
            self.transport.probe(&task.remote_identity, &self.credentials),
        )
        .await;

        let metadata = match probe {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) if e.is_auth() => return Err(e),
            Ok(Err(e)) => {
                debug!(error = %e, "Probe failed, downloading instead");
                return Ok(false);
            }
            Err(_) => {
                debug!("Probe timed out, downloading instead");
                return Ok(false);
            }
        };

        let Some(expected) = metadata.content_length.filter(|len| *len > 0) else {
            return Ok(false);
        };
        let actual = match tokio::fs::metadata(&task.destination).await {
            Ok(m) => m.len(),
            Err(_) => return Ok(false),
        };
        if actual != expected {
            debug!(expected, actual, "Existing file size differs from server, downloading");
            return Ok(false);
        }

        let sha256 = if self.config.verify_hash {
            crate::resume::sha256_file(&task.destination).ok()
        } else {
            None
        };
        self.dedup
            .mark_fetched(FetchRecord::new(identity.clone(), &task.destination, actual, sha256));
        info!(bytes = actual, "Existing file matches server size, skipping");
        Ok(true)
    }

    async fn within_timeout<F: std::future::Future>(&self, future: F) -> FetchResult<F::Output> {
        tokio::time::timeout(self.config.request_timeout, future)
            .await
            .map_err(|_| FetchError::Timeout(self.config.request_timeout))
    }

    async fn transfer(&self, task: &DownloadTask) -> FetchResult<StagedFile> {
        let RemoteBody {
            content_length,
            mut chunks,
        } = self
            .within_timeout(self.transport.open(&task.remote_identity, &self.credentials))
            .await??;

        let parent = task
            .destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(disk_error)?;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = self.config.verify_hash.then(Sha256::new);
        let chunk_size = self.config.chunk_size.max(1);
        let mut written: u64 = 0;

        // The request timeout bounds each wait for data, not the whole body
        while let Some(chunk) = self.within_timeout(chunks.next()).await? {
            let chunk = chunk?;
            for piece in chunk.chunks(chunk_size) {
                if self.cancelled() {
                    return Err(FetchError::Cancelled);
                }
                file.write_all(piece).await.map_err(disk_error)?;
                if let Some(hasher) = hasher.as_mut() {
                    hasher.update(piece);
                }
                written += piece.len() as u64;
                self.observer.on_transfer_progress(task, written, content_length);
                if !self.config.chunk_delay.is_zero() {
                    tokio::time::sleep(self.config.chunk_delay).await;
                }
            }
        }

        file.flush().await.map_err(disk_error)?;
        file.sync_all().await.map_err(disk_error)?;
        drop(file);

        if written == 0 {
            return Err(FetchError::EmptyBody);
        }
        if let Some(expected) = content_length {
            if expected != written {
                return Err(FetchError::SizeMismatch {
                    expected,
                    actual: written,
                });
            }
        }

        temp_path
            .persist(&task.destination)
            .map_err(|e| disk_error(e.error))?;

        debug!(bytes = written, path = %task.destination.display(), "Staged file written");
        Ok(StagedFile {
            bytes: written,
            sha256: hasher.map(|h| format!("{:x}", h.finalize())),
        })
    }
}

fn disk_error(e: std::io::Error) -> FetchError {
    FetchError::Disk(e.to_string())
}
