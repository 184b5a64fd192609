//! Retry message formatting for download attempts.
//!
//! Classifies a [`FetchError`] into a user-facing category and renders the
//! retry, success, and final-failure lines the executor logs.

use std::time::Duration;

use super::FetchError;

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request exceeded the per-request timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, reset
    NetworkOffline,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Authentication failures (401/407)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Body shorter or longer than advertised, or empty
    IncompleteBody,
    /// Local disk failure
    Disk,
    /// Cancelled by the operator
    Cancelled,
    /// Failure inside the downloader itself
    Internal,
}

impl RetryErrorType {
    /// Classify a fetch error
    pub fn from_error(err: &FetchError) -> Self {
        match err {
            FetchError::Auth { status, .. } => Self::AuthFailed(*status),
            FetchError::Network(_) => Self::NetworkOffline,
            FetchError::Timeout(_) => Self::NetworkTimeout,
            FetchError::Http { status: 429, .. } => Self::RateLimit,
            FetchError::Http { status, .. } if *status >= 500 => Self::ServerError(*status),
            FetchError::Http { status, .. } => Self::ClientError(*status),
            FetchError::SizeMismatch { .. } | FetchError::EmptyBody => Self::IncompleteBody,
            FetchError::Disk(_) => Self::Disk,
            FetchError::Cancelled => Self::Cancelled,
            FetchError::Internal(_) => Self::Internal,
        }
    }

    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "request timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                407 => "proxy authentication failed (407)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "report not found",
                _ => "client error",
            },
            Self::IncompleteBody => "incomplete response body",
            Self::Disk => "disk write failed",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal error",
        }
    }

    /// Suggested remediation presented after final failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Large reports can take minutes; raise --request-timeout-secs",
            Self::NetworkOffline => "Check VPN or intranet connectivity to the report server",
            Self::RateLimit => "Lower --max-workers or raise --delay-ms",
            Self::ServerError(_) => "The report server may be overloaded, try again later",
            Self::AuthFailed(_) => "Verify the domain username and password",
            Self::ClientError(_) => "Check the module code, year, and variant for this report",
            Self::IncompleteBody => "The connection dropped mid-transfer, retry the run",
            Self::Disk => "Check free space and permissions in the staging directory",
            Self::Cancelled => "Re-run to fetch the remaining reports",
            Self::Internal => "Re-run with RUST_LOG=report_downloader=debug and report the log",
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Task label (e.g., "CCM 2024_A")
    pub task: String,
    /// Original error message for details
    pub error_message: String,
}

impl RetryContext {
    /// Build a context from the error that ended an attempt
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error: &FetchError,
        backoff_duration: Duration,
        task: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::from_error(error),
            backoff_duration,
            task: task.into(),
            error_message: error.to_string(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying {} (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.task,
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        )
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        format!(
            "Attempt {}/{} succeeded for {}",
            self.attempt, self.max_attempts, self.task
        )
    }

    /// Format final failure summary with a suggestion.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![format!(
            "[FAILED] {} failed after {} attempt(s)",
            self.task, self.attempt
        )];
        lines.push(format!("  Last error: {}", self.error_message));
        lines.push(format!("  Suggestion: {}", self.error_type.suggestion()));
        lines.join("\n")
    }
}
