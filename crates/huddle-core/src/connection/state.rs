//! Connection state types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connectivity of the realtime transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Connected and syncing
    Connected,
    /// Attempting to connect
    Connecting,
    /// Not connected
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Status event as reported by the transport: `{"status": "connected"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStatus {
    pub status: ConnectionState,
}

/// A reconnect attempt waiting on its timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Attempt number the delay was computed for
    pub attempt: u32,
    pub delay: Duration,
}

/// Point-in-time view of the connection, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub is_online: bool,
    pub manual_disconnect: bool,
    pub attempt: u32,
    /// Delay of the pending reconnect, if one is scheduled
    #[serde(serialize_with = "serialize_retry_ms")]
    pub retry_in: Option<Duration>,
}

impl ConnectionSnapshot {
    /// Banner text for the user, if anything needs saying
    pub fn status_message(&self) -> Option<String> {
        if !self.is_online {
            return Some("You are offline. Changes will sync when reconnected.".to_string());
        }

        match self.state {
            ConnectionState::Connected => None,
            ConnectionState::Connecting => Some("Connecting...".to_string()),
            ConnectionState::Disconnected if self.manual_disconnect => {
                Some("Disconnected. Reconnect to resume syncing.".to_string())
            }
            ConnectionState::Disconnected => Some(match self.retry_in {
                Some(delay) => format!(
                    "Connection lost. Retrying in {}s.",
                    delay.as_secs().max(1)
                ),
                None => "Connection lost.".to_string(),
            }),
        }
    }
}

fn serialize_retry_ms<S: serde::Serializer>(
    retry_in: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match retry_in {
        Some(delay) => serializer.serialize_some(&(delay.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}
