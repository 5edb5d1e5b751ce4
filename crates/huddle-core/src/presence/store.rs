//! Presence storage
//!
//! The registry needs exactly two write primitives from a store: an atomic
//! upsert keyed by `(document_id, user_id)` and a delete-by-age. Each user
//! only ever writes their own row, so no further coordination is needed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::PresenceResult;
use super::model::PresenceRecord;

/// Backing store for presence records
pub trait PresenceStore: Send + Sync {
    /// Insert the record, or replace the existing one with the same key
    fn upsert(&self, record: &PresenceRecord) -> PresenceResult<()>;

    /// Records of a document with `updated_at >= min_updated_at`, ordered by user id
    fn list_since(&self, document_id: &str, min_updated_at: i64)
        -> PresenceResult<Vec<PresenceRecord>>;

    /// Delete every record with `updated_at < cutoff`, returning how many went
    fn delete_older_than(&self, cutoff: i64) -> PresenceResult<usize>;

    fn get(&self, document_id: &str, user_id: &str) -> PresenceResult<Option<PresenceRecord>>;

    /// Total number of stored records, stale or not
    fn count(&self) -> PresenceResult<usize>;
}

type RecordKey = (String, String);

/// Mutex-guarded map, for tests and single-process deployments
#[derive(Debug, Default)]
pub struct MemoryPresenceStore {
    records: Mutex<HashMap<RecordKey, PresenceRecord>>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<RecordKey, PresenceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PresenceStore for MemoryPresenceStore {
    fn upsert(&self, record: &PresenceRecord) -> PresenceResult<()> {
        let key = (record.document_id.clone(), record.user_id.clone());
        self.records().insert(key, record.clone());
        Ok(())
    }

    fn list_since(
        &self,
        document_id: &str,
        min_updated_at: i64,
    ) -> PresenceResult<Vec<PresenceRecord>> {
        let mut records: Vec<PresenceRecord> = self
            .records()
            .values()
            .filter(|r| r.document_id == document_id && r.updated_at >= min_updated_at)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }

    fn delete_older_than(&self, cutoff: i64) -> PresenceResult<usize> {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, r| r.updated_at >= cutoff);
        Ok(before - records.len())
    }

    fn get(&self, document_id: &str, user_id: &str) -> PresenceResult<Option<PresenceRecord>> {
        let key = (document_id.to_string(), user_id.to_string());
        Ok(self.records().get(&key).cloned())
    }

    fn count(&self) -> PresenceResult<usize> {
        Ok(self.records().len())
    }
}
