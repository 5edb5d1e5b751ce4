//! Local edit buffer
//!
//! Stages edits that have not reached the server yet, one entry per
//! document section. Buffering is a resilience aid rather than a durability
//! guarantee: every storage failure is logged and swallowed so the editor
//! keeps working.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::StorageError;
use super::storage::BufferStorage;
use crate::clock::{Clock, SystemClock};

const KEY_PREFIX: &str = "doc:";
const SECTION_MARKER: &str = ":section:";
const KEY_SUFFIX: &str = ":buffer";

/// A staged edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferEntry {
    /// The edit payload, exactly as it was saved
    pub content: Value,
    /// When the entry was written (ms since epoch)
    pub timestamp: i64,
}

/// Storage key for a document section: `doc:{documentId}:section:{sectionId}:buffer`
pub fn buffer_key(document_id: &str, section_id: &str) -> String {
    format!(
        "{}{}{}{}{}",
        KEY_PREFIX, document_id, SECTION_MARKER, section_id, KEY_SUFFIX
    )
}

/// Split a storage key back into `(document_id, section_id)`
fn parse_key(key: &str) -> Option<(&str, &str)> {
    let inner = key.strip_prefix(KEY_PREFIX)?.strip_suffix(KEY_SUFFIX)?;
    inner.split_once(SECTION_MARKER)
}

/// Best-effort staging area for unsent edits
#[derive(Clone)]
pub struct LocalBuffer {
    storage: Arc<dyn BufferStorage>,
    clock: Arc<dyn Clock>,
}

impl LocalBuffer {
    pub fn new(storage: Arc<dyn BufferStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn BufferStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Stage `content` for a section, replacing whatever was there
    pub fn save<T: Serialize + ?Sized>(&self, content: &T, document_id: &str, section_id: &str) {
        if let Err(e) = self.try_save(content, document_id, section_id) {
            log_failure("save", document_id, section_id, &e);
        }
    }

    /// Read the staged entry for a section
    ///
    /// Returns `None` when nothing is staged or the entry cannot be read.
    pub fn read(&self, document_id: &str, section_id: &str) -> Option<BufferEntry> {
        match self.try_read(document_id, section_id) {
            Ok(entry) => entry,
            Err(e) => {
                log_failure("read", document_id, section_id, &e);
                None
            }
        }
    }

    /// Drop the staged entry for a section, typically once it has synced
    pub fn clear(&self, document_id: &str, section_id: &str) {
        let key = buffer_key(document_id, section_id);
        if let Err(e) = self.storage.remove(&key) {
            log_failure("clear", document_id, section_id, &e);
        }
    }

    /// Sections of a document that still have staged edits
    pub fn pending_sections(&self, document_id: &str) -> Vec<String> {
        match self.storage.keys() {
            Ok(keys) => keys
                .iter()
                .filter_map(|key| parse_key(key))
                .filter(|(doc, _)| *doc == document_id)
                .map(|(_, section)| section.to_string())
                .collect(),
            Err(e) => {
                warn!(document_id, error = %e, "Failed to list buffered sections");
                Vec::new()
            }
        }
    }

    fn try_save<T: Serialize + ?Sized>(
        &self,
        content: &T,
        document_id: &str,
        section_id: &str,
    ) -> Result<(), StorageError> {
        let entry = BufferEntry {
            content: serde_json::to_value(content)?,
            timestamp: self.clock.now_ms(),
        };
        let json = serde_json::to_string(&entry)?;
        self.storage.set(&buffer_key(document_id, section_id), &json)?;
        debug!(document_id, section_id, "Buffered local edit");
        Ok(())
    }

    fn try_read(
        &self,
        document_id: &str,
        section_id: &str,
    ) -> Result<Option<BufferEntry>, StorageError> {
        let Some(json) = self.storage.get(&buffer_key(document_id, section_id))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }
}

fn log_failure(op: &str, document_id: &str, section_id: &str, error: &StorageError) {
    // Running out of space is expected under load; anything else is worth a warning
    if error.is_out_of_space() {
        debug!(document_id, section_id, error = %error, "Edit buffer {} skipped", op);
    } else {
        warn!(document_id, section_id, error = %error, "Edit buffer {} failed", op);
    }
}
