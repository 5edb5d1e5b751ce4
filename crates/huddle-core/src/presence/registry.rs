//! Presence registry
//!
//! Heartbeat-and-filter presence: clients refresh their own row every few
//! seconds and readers only see rows refreshed within the freshness window.
//! Nobody ever says goodbye; a client that stops beating simply ages out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use super::error::{PresenceError, PresenceResult};
use super::model::{Caller, Heartbeat, PresenceRecord, PresenceView};
use super::store::PresenceStore;
use super::subscription::PresenceSubscription;
use crate::clock::{Clock, SystemClock};

/// Maximum age of a record that still counts as present
pub const FRESHNESS_WINDOW: Duration = Duration::from_millis(15_000);

/// Capacity of the in-process change channel
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Presence registry over a shared store
///
/// Cheap to clone; clones share the store, clock and change channel.
#[derive(Clone)]
pub struct PresenceRegistry {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    freshness_window_ms: i64,
    changes: broadcast::Sender<String>,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn PresenceStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            freshness_window_ms: FRESHNESS_WINDOW.as_millis() as i64,
            changes,
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window_ms = window.as_millis() as i64;
        self
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms as u64)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Refresh the caller's presence on a document
    ///
    /// Creates the record on the first heartbeat and overwrites cursor,
    /// display name, display color and timestamp on every later one.
    pub fn heartbeat(&self, caller: &Caller, heartbeat: Heartbeat) -> PresenceResult<()> {
        let user_id = caller.user_id().ok_or(PresenceError::Unauthenticated)?;
        let record = PresenceRecord::from_heartbeat(user_id, heartbeat, self.clock.now_ms());

        self.store.upsert(&record)?;
        debug!(
            document_id = %record.document_id,
            user_id = %record.user_id,
            "Presence heartbeat"
        );

        // No receivers is fine
        let _ = self.changes.send(record.document_id);
        Ok(())
    }

    /// Users currently present on a document, ordered by user id
    ///
    /// Stale records are skipped here but left in the store for cleanup.
    pub fn list(&self, document_id: &str) -> PresenceResult<Vec<PresenceView>> {
        let min_updated_at = self.clock.now_ms().saturating_sub(self.freshness_window_ms);
        let records = self.store.list_since(document_id, min_updated_at)?;
        Ok(records.into_iter().map(PresenceView::from).collect())
    }

    /// Delete every record older than `older_than_ms`
    pub fn cleanup(&self, older_than_ms: u64) -> PresenceResult<usize> {
        let age = i64::try_from(older_than_ms).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_ms().saturating_sub(age);
        let removed = self.store.delete_older_than(cutoff)?;
        debug!(removed, cutoff, "Presence cleanup");
        Ok(removed)
    }

    /// Total stored records, including stale ones awaiting cleanup
    pub fn record_count(&self) -> PresenceResult<usize> {
        self.store.count()
    }

    /// Follow a document's presence list
    ///
    /// The subscription re-reads the registry whenever a heartbeat for the
    /// document lands in this process, and at least every `poll_interval`
    /// so that expiry and writes from other processes are noticed.
    pub fn subscribe(&self, document_id: &str, poll_interval: Duration) -> PresenceSubscription {
        PresenceSubscription::new(
            self.clone(),
            document_id.to_string(),
            self.changes.subscribe(),
            poll_interval,
        )
    }
}
