//! Transport layer for report retrieval
//!
//! A [`Transport`] performs one authenticated request and hands back the body
//! as a stream of byte chunks. Retry, throttling, and file handling live in
//! [`crate::downloader`]; transports only classify what went wrong.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::time::Duration;

pub mod credentials;
pub mod http;
pub mod ntlm;
pub mod retry_formatter;

pub use credentials::{CredentialError, CredentialProvider, Credentials, EnvCredentials};
pub use http::{AuthScheme, HttpTransport};

/// Per-task fetch errors
///
/// Cloneable so a run-level abort can stamp the same cause onto every task
/// that never started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Server rejected the credentials (401/407)
    #[error("authentication failed (HTTP {status}): {message}")]
    Auth {
        /// HTTP status returned by the server
        status: u16,
        /// Server or transport message
        message: String,
    },

    /// Connection-level failure or truncated body
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the per-request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status other than authentication failures
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status
        status: u16,
        /// Reason phrase or body excerpt
        message: String,
    },

    /// Downloaded byte count disagrees with the advertised length
    #[error("size mismatch: expected {expected} bytes, received {actual}")]
    SizeMismatch {
        /// Content-Length reported by the server
        expected: u64,
        /// Bytes actually received
        actual: u64,
    },

    /// Server answered with an empty body
    #[error("server returned an empty body")]
    EmptyBody,

    /// Local filesystem failure while staging the file
    #[error("disk error: {0}")]
    Disk(String),

    /// Transfer aborted by a cancellation request
    #[error("transfer cancelled")]
    Cancelled,

    /// Worker-side failure unrelated to the remote server
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_)
            | FetchError::Timeout(_)
            | FetchError::SizeMismatch { .. }
            | FetchError::EmptyBody => true,
            FetchError::Http { status, .. } => *status == 429 || *status >= 500,
            FetchError::Auth { .. }
            | FetchError::Disk(_)
            | FetchError::Cancelled
            | FetchError::Internal(_) => false,
        }
    }

    /// Authentication failures abort the whole run
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth { .. })
    }

    /// Gateway-style statuses that earn an extra backoff
    pub fn is_server_busy(&self) -> bool {
        matches!(self, FetchError::Http { status: 502..=504, .. })
    }

    /// Short label used as a metrics tag
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Auth { .. } => "auth",
            FetchError::Network(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::Http { .. } => "http",
            FetchError::SizeMismatch { .. } => "size_mismatch",
            FetchError::EmptyBody => "empty_body",
            FetchError::Disk(_) => "disk",
            FetchError::Cancelled => "cancelled",
            FetchError::Internal(_) => "internal",
        }
    }

    /// Map an HTTP status to an error, `None` for success statuses
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 407 => Some(FetchError::Auth {
                status,
                message: message.into(),
            }),
            _ => Some(FetchError::Http {
                status,
                message: message.into(),
            }),
        }
    }
}

/// Result type for transport operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Stream of body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = FetchResult<Bytes>> + Send>>;

/// Metadata returned by a pre-flight probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteMetadata {
    /// Advertised body length, if the server sent one
    pub content_length: Option<u64>,
}

/// An opened response body
pub struct RemoteBody {
    /// Advertised body length, if the server sent one
    pub content_length: Option<u64>,
    /// Body chunks as they arrive
    pub chunks: ByteStream,
}

impl std::fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Authenticated request transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch metadata without downloading the body
    async fn probe(&self, url: &str, credentials: &Credentials) -> FetchResult<RemoteMetadata>;

    /// Start a download and return the streaming body
    async fn open(&self, url: &str, credentials: &Credentials) -> FetchResult<RemoteBody>;
}
