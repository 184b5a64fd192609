//! Run-wide progress accounting and observer hooks.
//!
//! [`RunState`] holds the aggregate counters for one run behind a single
//! mutex. Observers receive one event per [`TaskResult`] plus periodic
//! [`RunSnapshot`]s; they are fire-and-forget and must not block.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::job::{DownloadTask, TaskIdentity, TaskOutcome, TaskResult};
use super::orchestrator::ModuleReport;

#[derive(Debug, Default)]
struct Counters {
    queued: usize,
    in_flight: HashSet<TaskIdentity>,
    done: usize,
    failed: usize,
    skipped: usize,
    bytes_written: u64,
}

/// Aggregate counters for one orchestrated run
#[derive(Debug)]
pub struct RunState {
    started: Instant,
    counters: Mutex<Counters>,
}

impl RunState {
    /// Fresh state with `queued` tasks
    pub fn new(queued: usize) -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters {
                queued,
                ..Counters::default()
            }),
        }
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark an identity in flight; false if it already is
    pub fn try_begin(&self, identity: &TaskIdentity) -> bool {
        self.counters().in_flight.insert(identity.clone())
    }

    /// Record the outcome of a task that [`try_begin`](Self::try_begin) admitted
    pub fn finish(&self, identity: &TaskIdentity, outcome: &TaskOutcome) {
        let mut counters = self.counters();
        counters.in_flight.remove(identity);
        Self::count(&mut counters, outcome);
    }

    /// Record the outcome of a task that was never admitted
    pub fn record(&self, outcome: &TaskOutcome) {
        Self::count(&mut self.counters(), outcome);
    }

    fn count(counters: &mut Counters, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Success { bytes_written, .. } => {
                counters.done += 1;
                counters.bytes_written += bytes_written;
            }
            TaskOutcome::Skipped(_) => counters.skipped += 1,
            TaskOutcome::Failed(_) => counters.failed += 1,
        }
        let settled = counters.done + counters.failed + counters.skipped;
        if settled > counters.queued {
            warn!(
                settled,
                queued = counters.queued,
                "More task outcomes recorded than tasks queued"
            );
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> RunSnapshot {
        let counters = self.counters();
        RunSnapshot {
            queued: counters.queued,
            in_flight: counters.in_flight.len(),
            done: counters.done,
            failed: counters.failed,
            skipped: counters.skipped,
            bytes_written: counters.bytes_written,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Point-in-time view of [`RunState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSnapshot {
    /// Tasks queued for the run
    pub queued: usize,
    /// Tasks currently transferring
    pub in_flight: usize,
    /// Successful transfers
    pub done: usize,
    /// Failed tasks
    pub failed: usize,
    /// Skipped tasks
    pub skipped: usize,
    /// Bytes written by successful transfers
    pub bytes_written: u64,
    /// Time since the run started
    pub elapsed: Duration,
}

impl RunSnapshot {
    /// Tasks with a final outcome
    pub fn settled(&self) -> usize {
        self.done + self.failed + self.skipped
    }

    /// Completion percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.queued == 0 {
            return 100.0;
        }
        self.settled() as f64 / self.queued as f64 * 100.0
    }

    /// Remaining time extrapolated from the settle rate so far
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let settled = self.settled();
        if settled == 0 || settled >= self.queued {
            return None;
        }
        let per_task = self.elapsed.as_secs_f64() / settled as f64;
        Some(Duration::from_secs_f64(
            per_task * (self.queued - settled) as f64,
        ))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} files ({:.1}%)",
            self.settled(),
            self.queued,
            self.percentage()
        )];
        parts.push(format!(
            "- {} downloaded, {} skipped, {} failed, {} in flight",
            self.done, self.skipped, self.failed, self.in_flight
        ));
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }
        parts.join(" ")
    }
}

/// Sink for run events
///
/// Implementations are called from worker tasks and must be cheap.
pub trait ProgressObserver: Send + Sync {
    /// One call per finished task
    fn on_task_result(&self, result: &TaskResult);

    /// Periodic aggregate snapshot
    fn on_snapshot(&self, snapshot: &RunSnapshot);

    /// Bytes written so far for one transfer
    fn on_transfer_progress(&self, _task: &DownloadTask, _bytes: u64, _total: Option<u64>) {}

    /// Consolidation and optimization finished for one module
    fn on_module_processed(&self, _report: &ModuleReport) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_task_result(&self, _result: &TaskResult) {}
    fn on_snapshot(&self, _snapshot: &RunSnapshot) {}
}

/// Observer that writes events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn on_task_result(&self, result: &TaskResult) {
        let task = result.task.label();
        match &result.outcome {
            TaskOutcome::Success { bytes_written, .. } => info!(
                task = %task,
                bytes = bytes_written,
                attempts = result.attempts,
                duration_ms = result.duration.as_millis() as u64,
                "Downloaded"
            ),
            TaskOutcome::Skipped(reason) => info!(task = %task, reason = %reason, "Skipped"),
            TaskOutcome::Failed(error) => warn!(
                task = %task,
                attempts = result.attempts,
                error = %error,
                "Failed"
            ),
        }
    }

    fn on_snapshot(&self, snapshot: &RunSnapshot) {
        info!("{}", snapshot.format_progress());
    }

    fn on_module_processed(&self, report: &ModuleReport) {
        info!("{}", report.format_line());
    }
}

/// Compact duration rendering (`45s`, `3m`, `1.5h`)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
