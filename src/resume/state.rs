//! Persisted fetch ledger
//!
//! The ledger lists every identity whose file was fetched and verified, so a
//! later run can skip it without contacting the server. Writes are atomic
//! (temp file, fsync, rename) and guarded by an advisory lock file.

use super::record::{FetchRecord, Verification};
use crate::downloader::job::TaskIdentity;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Current ledger schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// File name of the ledger inside the staging root
pub const LEDGER_FILE_NAME: &str = ".fetch-ledger.json";

/// Maximum allowed ledger size (64 MB) to prevent memory exhaustion
pub const MAX_LEDGER_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Ledger of verified fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchLedger {
    schema_version: String,
    records: Vec<FetchRecord>,
    created_at: i64,
    updated_at: i64,
}

impl Default for FetchLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchLedger {
    /// Empty ledger
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            records: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Ledger holding `records`, ordered by identity
    pub fn from_records(mut records: Vec<FetchRecord>) -> Self {
        records.sort_by(|a, b| a.identity().cmp(b.identity()));
        records.dedup_by(|a, b| a.identity() == b.identity());
        let mut ledger = Self::new();
        ledger.records = records;
        ledger
    }

    /// All records
    pub fn records(&self) -> &[FetchRecord] {
        &self.records
    }

    /// Record for an identity
    pub fn get(&self, identity: &TaskIdentity) -> Option<&FetchRecord> {
        self.records.iter().find(|r| r.identity() == identity)
    }

    /// Insert or replace a record
    pub fn upsert(&mut self, record: FetchRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.identity() == record.identity())
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Drop a record, returning it
    pub fn remove(&mut self, identity: &TaskIdentity) -> Option<FetchRecord> {
        let index = self.records.iter().position(|r| r.identity() == identity)?;
        self.updated_at = chrono::Utc::now().timestamp_millis();
        Some(self.records.remove(index))
    }

    /// Verify every record against its staged file
    pub fn audit(&self, check_hash: bool) -> Vec<(&FetchRecord, Verification)> {
        self.records
            .iter()
            .map(|record| (record, record.verify(record.local_path(), check_hash)))
            .collect()
    }

    /// Save ledger to file with atomic writes and file locking
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        debug!(
            path = %path.display(),
            records = self.records.len(),
            "Saving fetch ledger"
        );

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;

        // Flush and sync before the rename so the new ledger is durable
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Fsync parent directory so the rename itself survives a crash
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        info!(
            path = %path.display(),
            records = self.records.len(),
            "Fetch ledger saved"
        );
        Ok(())
    }

    /// Load ledger from file with locking
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        debug!(path = %path.display(), "Loading fetch ledger");

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_LEDGER_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_LEDGER_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let ledger: FetchLedger = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize fetch ledger");
            ResumeError::DeserializationError(e.to_string())
        })?;

        if ledger.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %ledger.schema_version,
                expected_version = SCHEMA_VERSION,
                "Fetch ledger schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: ledger.schema_version,
            });
        }

        info!(records = ledger.records.len(), "Fetch ledger loaded");
        Ok(ledger)
    }

    /// Load the ledger, or start empty if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ResumeError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No fetch ledger found, starting fresh");
            Ok(Self::new())
        }
    }
}

/// Errors related to the ledger and staging lock
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Ledger file too large
    #[error("ledger file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// Another process holds the staging lock
    #[error("staging area {0} is locked by another run")]
    StagingLocked(String),
}
