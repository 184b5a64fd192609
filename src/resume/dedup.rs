//! In-memory deduplication of fetched identities

use super::record::FetchRecord;
use super::state::FetchLedger;
use crate::downloader::job::TaskIdentity;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Set of identities already fetched and verified
///
/// Seeded from the persisted ledger at run start and updated by workers only
/// after a transfer is confirmed on disk.
#[derive(Debug, Default)]
pub struct Deduplicator {
    fetched: Mutex<HashMap<TaskIdentity, FetchRecord>>,
}

impl Deduplicator {
    /// Empty deduplicator
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a ledger
    pub fn from_ledger(ledger: &FetchLedger) -> Self {
        let fetched = ledger
            .records()
            .iter()
            .map(|r| (r.identity().clone(), r.clone()))
            .collect();
        Self {
            fetched: Mutex::new(fetched),
        }
    }

    fn fetched(&self) -> MutexGuard<'_, HashMap<TaskIdentity, FetchRecord>> {
        self.fetched.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the identity has a fetch record
    pub fn already_fetched(&self, identity: &TaskIdentity) -> bool {
        self.fetched().contains_key(identity)
    }

    /// Copy of the record for an identity
    pub fn record(&self, identity: &TaskIdentity) -> Option<FetchRecord> {
        self.fetched().get(identity).cloned()
    }

    /// Record a verified fetch
    pub fn mark_fetched(&self, record: FetchRecord) {
        self.fetched().insert(record.identity().clone(), record);
    }

    /// Forget an identity whose staged file no longer verifies
    pub fn forget(&self, identity: &TaskIdentity) -> Option<FetchRecord> {
        self.fetched().remove(identity)
    }

    /// Number of recorded identities
    pub fn len(&self) -> usize {
        self.fetched().len()
    }

    /// True when nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ledger of the current contents
    pub fn to_ledger(&self) -> FetchLedger {
        FetchLedger::from_records(self.fetched().values().cloned().collect())
    }
}
