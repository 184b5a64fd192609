//! CLI error types and conversions

use crate::consolidate::ConsolidationError;
use crate::downloader::{DownloadError, RunStatus};
use crate::fetcher::{CredentialError, FetchError};
use crate::identifier::IdentifierError;
use crate::metrics::MetricsError;
use crate::output::OptimizationError;
use crate::registry::RegistryError;
use crate::resume::ResumeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Identifier error
    #[error("identifier error: {0}")]
    IdentifierError(#[from] IdentifierError),

    /// Registry error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Download error
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Transport setup error
    #[error("transport error: {0}")]
    FetchError(#[from] FetchError),

    /// Credentials missing or invalid
    #[error("credential error: {0}")]
    CredentialError(#[from] CredentialError),

    /// Consolidation error
    #[error("consolidation error: {0}")]
    ConsolidationError(#[from] ConsolidationError),

    /// Artifact error
    #[error("optimization error: {0}")]
    OptimizationError(#[from] OptimizationError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The run finished without every task succeeding
    #[error("run finished with status: {0}")]
    RunIncomplete(RunStatus),

    /// Validation found problems
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}
