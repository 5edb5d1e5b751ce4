//! Presence subscriptions
//!
//! Push where we can, poll where we must: in-process heartbeats wake the
//! subscription immediately, and a poll tick catches records expiring out
//! of the freshness window (which is not a write) and writes made by other
//! processes sharing the store.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::error::PresenceResult;
use super::model::PresenceView;
use super::registry::PresenceRegistry;

/// Stream of presence lists for one document
pub struct PresenceSubscription {
    registry: PresenceRegistry,
    document_id: String,
    changes: broadcast::Receiver<String>,
    poll: Interval,
    last: Option<Vec<PresenceView>>,
}

impl PresenceSubscription {
    pub(super) fn new(
        registry: PresenceRegistry,
        document_id: String,
        changes: broadcast::Receiver<String>,
        poll_interval: Duration,
    ) -> Self {
        let period = poll_interval.max(Duration::from_millis(1));
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            registry,
            document_id,
            changes,
            poll,
            last: None,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Wait for the next distinct presence list
    ///
    /// The first call returns the current list straight away. Later calls
    /// return only when the list differs from the one returned before.
    pub async fn next(&mut self) -> PresenceResult<Vec<PresenceView>> {
        if self.last.is_none() {
            return self.refresh();
        }

        loop {
            tokio::select! {
                changed = self.changes.recv() => match changed {
                    Ok(document_id) if document_id != self.document_id => continue,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        self.poll.tick().await;
                    }
                },
                _ = self.poll.tick() => {}
            }

            let current = self.registry.list(&self.document_id)?;
            if self.last.as_ref() != Some(&current) {
                self.last = Some(current.clone());
                return Ok(current);
            }
        }
    }

    fn refresh(&mut self) -> PresenceResult<Vec<PresenceView>> {
        let current = self.registry.list(&self.document_id)?;
        self.last = Some(current.clone());
        Ok(current)
    }
}
