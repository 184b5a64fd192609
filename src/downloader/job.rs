//! Download task structures and per-task outcomes

use crate::fetcher::FetchError;
use crate::identifier::{DateKey, Module};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Deduplication key: `(module, date key, remote identity)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskIdentity {
    /// Report module
    pub module: Module,
    /// Period and variant
    pub date_key: DateKey,
    /// URL or report key
    pub remote_identity: String,
}

impl fmt::Display for TaskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.module, self.date_key)
    }
}

/// One remote file to retrieve
///
/// Tasks are never mutated after they are queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Report module
    pub module: Module,
    /// Period and variant
    pub date_key: DateKey,
    /// URL or report key
    pub remote_identity: String,
    /// Final location of the staged file
    pub destination: PathBuf,
}

impl DownloadTask {
    /// Create a task
    pub fn new(
        module: Module,
        date_key: DateKey,
        remote_identity: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            module,
            date_key,
            remote_identity: remote_identity.into(),
            destination: destination.into(),
        }
    }

    /// Deduplication key for this task
    pub fn identity(&self) -> TaskIdentity {
        TaskIdentity {
            module: self.module.clone(),
            date_key: self.date_key.clone(),
            remote_identity: self.remote_identity.clone(),
        }
    }

    /// Short label for logs, e.g. `CCM 2024_A`
    pub fn label(&self) -> String {
        format!("{} {}", self.module, self.date_key)
    }
}

/// Why a task did not transfer anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The fetch ledger records the file and the staged copy verifies
    AlreadyFetched,
    /// Unrecorded staged file whose size matched the server's metadata
    VerifiedExisting,
    /// Another worker is transferring the same identity
    DuplicateInFlight,
    /// The run was cancelled before the task finished
    Cancelled,
}

impl SkipReason {
    /// Whether the staged file can be consumed downstream
    pub fn has_local_file(&self) -> bool {
        matches!(self, SkipReason::AlreadyFetched | SkipReason::VerifiedExisting)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::AlreadyFetched => "already fetched",
            SkipReason::VerifiedExisting => "existing file verified",
            SkipReason::DuplicateInFlight => "duplicate in flight",
            SkipReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Final outcome of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// File staged at `local_path`
    Success {
        /// Bytes written to disk
        bytes_written: u64,
        /// Where the file now lives
        local_path: PathBuf,
    },
    /// Nothing transferred
    Skipped(SkipReason),
    /// Gave up with the last error
    Failed(FetchError),
}

impl TaskOutcome {
    /// True for [`TaskOutcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }

    /// True for [`TaskOutcome::Failed`]
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    /// True for [`TaskOutcome::Skipped`]
    pub fn is_skipped(&self) -> bool {
        matches!(self, TaskOutcome::Skipped(_))
    }
}

/// Result record emitted exactly once per task per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// The task
    pub task: DownloadTask,
    /// What happened
    pub outcome: TaskOutcome,
    /// Transfer attempts made (zero when skipped before any request)
    pub attempts: u32,
    /// Wall time spent on the task
    pub duration: Duration,
}

impl TaskResult {
    /// Build a result
    pub fn new(task: DownloadTask, outcome: TaskOutcome, attempts: u32, duration: Duration) -> Self {
        Self {
            task,
            outcome,
            attempts,
            duration,
        }
    }

    /// Staged file usable for consolidation, if any
    pub fn local_file(&self) -> Option<&PathBuf> {
        match &self.outcome {
            TaskOutcome::Success { local_path, .. } => Some(local_path),
            TaskOutcome::Skipped(reason) if reason.has_local_file() => Some(&self.task.destination),
            _ => None,
        }
    }
}
