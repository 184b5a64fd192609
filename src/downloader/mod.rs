//! Download orchestration, throttling, and the worker pool
//!
//! # Overview
//!
//! A run moves through these stages:
//!
//! 1. **Expansion**: [`orchestrator::Orchestrator::expand`] turns modules, a
//!    date range, and variants into [`job::DownloadTask`]s
//! 2. **Execution**: [`executor::DownloadExecutor`] drains the task queue with
//!    a fixed [`pool::WorkerPool`], gated by a [`throttle::Throttle`]
//! 3. **Resume**: tasks whose staged file verifies against the fetch ledger
//!    are skipped without contacting the server
//! 4. **Post-processing**: modules with new files are consolidated and
//!    written out in the requested artifact formats
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use report_downloader::downloader::{DownloadConfig, DownloadRequest, Orchestrator};
//! use report_downloader::fetcher::{Credentials, HttpTransport};
//! use report_downloader::identifier::{DateRange, Module};
//! use report_downloader::output::StagingLayout;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloadConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::new(config.connect_timeout)?);
//! let layout = StagingLayout::new("./staging", "./output");
//! let orchestrator = Orchestrator::new(config, transport, layout)?;
//!
//! let request = DownloadRequest::new(vec![Module::Ccm], DateRange::years(2022, 2024)?)
//!     .with_variants(["A", "P"]);
//! let credentials = Credentials::new("DOMAIN\\user", "secret")?;
//! let summary = orchestrator.run(&request, &credentials).await?;
//! println!("{}", summary.status);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Per-task failures never escape as `Err`; they are reported as
//! [`job::TaskOutcome::Failed`] inside the run summary. [`DownloadError`] is
//! reserved for failures that prevent a run from starting or finishing:
//! invalid configuration, missing directories, a locked staging area, or an
//! unwritable ledger.

pub mod config;
pub mod executor;
pub mod job;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod throttle;

pub use config::DownloadConfig;
pub use executor::DownloadExecutor;
pub use job::{DownloadTask, SkipReason, TaskIdentity, TaskOutcome, TaskResult};
pub use orchestrator::{
    ConsolidationSummary, DownloadRequest, ModuleCounts, ModuleReport, Orchestrator, RunMode,
    RunStatus, RunSummary,
};
pub use pool::{PoolOutput, WorkerPool};
pub use progress::{LoggingObserver, NoopObserver, ProgressObserver, RunSnapshot, RunState};
pub use throttle::{Throttle, ThrottleError, ThrottlePermit};

use std::path::PathBuf;

use crate::identifier::IdentifierError;
use crate::resolver::ResolveError;
use crate::resume::ResumeError;

/// Run-level errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Configuration value out of range or unparsable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required directory does not exist
    #[error("directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// No usable credentials
    #[error("no credentials: {0}")]
    NoCredentials(String),

    /// A task's remote identity could not be built
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Ledger or staging lock failure
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),

    /// Bad module, period, or range
    #[error("identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// The throttle refused to issue permits
    #[error("throttle error: {0}")]
    Throttle(#[from] ThrottleError),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}
