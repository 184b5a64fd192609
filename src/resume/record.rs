//! Fetch records and staged-file verification

use crate::downloader::job::TaskIdentity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Proof that one identity was fetched and written completely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
    identity: TaskIdentity,
    local_path: PathBuf,
    bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    fetched_at: i64,
}

impl FetchRecord {
    /// Record a completed fetch, stamped now
    pub fn new(
        identity: TaskIdentity,
        local_path: impl Into<PathBuf>,
        bytes: u64,
        sha256: Option<String>,
    ) -> Self {
        Self {
            identity,
            local_path: local_path.into(),
            bytes,
            sha256,
            fetched_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// The fetched identity
    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    /// Where the file was staged
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Size written
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex SHA-256, when recorded
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    /// Fetch time (Unix millis)
    pub fn fetched_at(&self) -> i64 {
        self.fetched_at
    }

    /// Check the staged file at `path` against this record
    ///
    /// Size is always compared. The hash is compared only when `check_hash`
    /// is set and a hash was recorded.
    pub fn verify(&self, path: &Path, check_hash: bool) -> Verification {
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => return Verification::Missing,
        };
        if metadata.len() == 0 {
            return Verification::Empty;
        }
        if metadata.len() != self.bytes {
            return Verification::SizeMismatch {
                expected: self.bytes,
                actual: metadata.len(),
            };
        }
        if let (true, Some(expected)) = (check_hash, self.sha256.as_deref()) {
            match sha256_file(path) {
                Ok(actual) if actual == expected => {}
                Ok(_) => return Verification::HashMismatch,
                Err(_) => return Verification::Missing,
            }
        }
        Verification::Valid
    }
}

/// Outcome of checking a staged file against its record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Size (and hash, if checked) match
    Valid,
    /// File absent or unreadable
    Missing,
    /// Zero-length file
    Empty,
    /// Size differs from the record
    SizeMismatch {
        /// Recorded size
        expected: u64,
        /// Size on disk
        actual: u64,
    },
    /// Content hash differs from the record
    HashMismatch,
}

impl Verification {
    /// True for [`Verification::Valid`]
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

/// Lowercase hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
