//! Resume support for interrupted runs
//!
//! Provides the persisted fetch ledger, in-memory deduplication, staged-file
//! verification, and the staging-area lock.

pub mod dedup;
pub mod lock;
pub mod record;
pub mod state;

pub use dedup::Deduplicator;
pub use lock::StagingLock;
pub use record::{sha256_file, FetchRecord, Verification};
pub use state::{FetchLedger, ResumeError, LEDGER_FILE_NAME};
