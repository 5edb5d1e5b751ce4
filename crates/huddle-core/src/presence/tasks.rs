//! Background presence tasks
//!
//! - Heartbeat loop: run by each client while a document is open
//! - Cleanup sweeper: run out-of-band next to the store

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::error::PresenceError;
use super::model::{Caller, Heartbeat};
use super::registry::PresenceRegistry;

/// Spawn the client heartbeat loop
///
/// Beats immediately, then every `interval`, publishing whatever cursor is
/// current in `cursor_rx`. A failed beat is logged and left for the next
/// tick to supersede. The loop ends when the cursor sender is dropped, or
/// when the registry rejects the caller as unauthenticated, since no later
/// beat can succeed either.
pub fn spawn_heartbeat(
    registry: PresenceRegistry,
    caller: Caller,
    template: Heartbeat,
    mut cursor_rx: watch::Receiver<String>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if cursor_rx.has_changed().is_err() {
                debug!(document_id = %template.document_id, "Cursor source closed, stopping heartbeat");
                break;
            }

            let mut heartbeat = template.clone();
            heartbeat.cursor = cursor_rx.borrow_and_update().clone();

            match registry.heartbeat(&caller, heartbeat) {
                Ok(()) => {}
                Err(PresenceError::Unauthenticated) => {
                    warn!(document_id = %template.document_id, "Heartbeat rejected: not authenticated");
                    break;
                }
                Err(e) => {
                    warn!(document_id = %template.document_id, error = %e, "Heartbeat failed");
                }
            }
        }
    })
}

/// Spawn the periodic cleanup sweeper
///
/// Deletes records older than `older_than_ms` every `interval`. Failures
/// stay inside this task; heartbeats and listings are unaffected.
pub fn spawn_cleanup_sweeper(
    registry: PresenceRegistry,
    interval: Duration,
    older_than_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match registry.cleanup(older_than_ms) {
                Ok(0) => debug!("Presence sweep: nothing to remove"),
                Ok(removed) => info!(removed, "Presence sweep removed stale records"),
                Err(e) => warn!(error = %e, "Presence sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::ManualClock;
    use crate::presence::{MemoryPresenceStore, PresenceStore};

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_heartbeat_publishes_latest_cursor() {
        let store = Arc::new(MemoryPresenceStore::new());
        let registry = PresenceRegistry::new(store.clone());
        let (cursor_tx, cursor_rx) = watch::channel("start".to_string());

        let handle = spawn_heartbeat(
            registry,
            Caller::user("ada"),
            Heartbeat::new("doc", "").with_display_name(Some("Ada".to_string())),
            cursor_rx,
            Duration::from_millis(10),
        );

        wait_until(|| store.get("doc", "ada").unwrap().is_some()).await;

        cursor_tx.send("moved".to_string()).unwrap();
        wait_until(|| store.get("doc", "ada").unwrap().unwrap().cursor == "moved").await;

        let record = store.get("doc", "ada").unwrap().unwrap();
        assert_eq!(record.display_name.as_deref(), Some("Ada"));

        drop(cursor_tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_stops_when_unauthenticated() {
        let store = Arc::new(MemoryPresenceStore::new());
        let registry = PresenceRegistry::new(store.clone());
        let (_cursor_tx, cursor_rx) = watch::channel(String::new());

        let handle = spawn_heartbeat(
            registry,
            Caller::anonymous(),
            Heartbeat::new("doc", ""),
            cursor_rx,
            Duration::from_millis(10),
        );

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_removes_stale_records() {
        let store = Arc::new(MemoryPresenceStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let registry = PresenceRegistry::with_clock(store.clone(), clock.clone());
        registry
            .heartbeat(&Caller::user("ada"), Heartbeat::new("doc", ""))
            .unwrap();
        clock.set(90_000);
        registry
            .heartbeat(&Caller::user("bob"), Heartbeat::new("doc", ""))
            .unwrap();

        let handle = spawn_cleanup_sweeper(registry, Duration::from_millis(10), 60_000);

        wait_until(|| store.count().unwrap() == 1).await;
        assert!(store.get("doc", "bob").unwrap().is_some());
        handle.abort();
    }
}
