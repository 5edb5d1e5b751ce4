//! Connection state machine
//!
//! Pure state: feeds on transport status events and user actions and says
//! what should happen next (arm or cancel the reconnect timer, ask the
//! transport to connect or disconnect). The async driver carries the
//! requests out, which keeps every transition testable without a runtime.

use std::time::Duration;

use super::state::{ConnectionSnapshot, ConnectionState, ScheduledRetry};
use crate::backoff::BackoffPolicy;

/// What to do with the reconnect timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    /// Arm the timer, replacing any pending one
    Schedule(Duration),
    /// Drop the pending timer
    Cancel,
}

/// What to ask of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRequest {
    Connect,
    Disconnect,
}

/// Side effects of a transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    pub timer: Option<TimerRequest>,
    pub transport: Option<TransportRequest>,
}

/// Client-side connection tracker
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    /// Set by a manual disconnect; suppresses automatic retries
    manual_disconnect: bool,
    /// Browser-style online/offline signal; messaging only
    is_online: bool,
    /// Attempt number used for the next backoff delay (1-based)
    attempt: u32,
    pending_retry: Option<ScheduledRetry>,
    policy: BackoffPolicy,
}

impl ConnectionMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Connecting,
            manual_disconnect: false,
            is_online: true,
            attempt: 1,
            pending_retry: None,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_manually_disconnected(&self) -> bool {
        self.manual_disconnect
    }

    pub fn is_online(&self) -> bool {
        self.is_online
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn pending_retry(&self) -> Option<ScheduledRetry> {
        self.pending_retry
    }

    /// Apply a status reported by the transport
    ///
    /// The transport is authoritative, so the state is taken as-is.
    pub fn on_transport_status(&mut self, status: ConnectionState) -> Effects {
        self.state = status;

        match status {
            ConnectionState::Connected => {
                self.attempt = 1;
                Effects {
                    timer: self.cancel_retry(),
                    transport: None,
                }
            }
            ConnectionState::Connecting => Effects::default(),
            ConnectionState::Disconnected if self.manual_disconnect => Effects {
                timer: self.cancel_retry(),
                transport: None,
            },
            ConnectionState::Disconnected => Effects {
                timer: Some(self.schedule_retry()),
                transport: None,
            },
        }
    }

    /// The reconnect timer fired
    pub fn on_retry_elapsed(&mut self) -> Effects {
        self.pending_retry = None;

        if self.manual_disconnect {
            return Effects::default();
        }

        self.attempt = self.attempt.saturating_add(1);
        Effects {
            timer: None,
            transport: Some(TransportRequest::Connect),
        }
    }

    /// User asked to go offline; no retries until `reconnect`
    pub fn disconnect(&mut self) -> Effects {
        self.manual_disconnect = true;
        self.state = ConnectionState::Disconnected;
        Effects {
            timer: self.cancel_retry(),
            transport: Some(TransportRequest::Disconnect),
        }
    }

    /// User asked to connect again
    pub fn reconnect(&mut self) -> Effects {
        self.manual_disconnect = false;
        self.attempt = 1;
        self.state = ConnectionState::Connecting;
        Effects {
            timer: self.cancel_retry(),
            transport: Some(TransportRequest::Connect),
        }
    }

    /// Record the platform online/offline signal
    ///
    /// Never changes the connection state.
    pub fn set_online(&mut self, online: bool) {
        self.is_online = online;
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            is_online: self.is_online,
            manual_disconnect: self.manual_disconnect,
            attempt: self.attempt,
            retry_in: self.pending_retry.map(|r| r.delay),
        }
    }

    /// Banner text for the user, if anything needs saying
    pub fn status_message(&self) -> Option<String> {
        self.snapshot().status_message()
    }

    fn schedule_retry(&mut self) -> TimerRequest {
        let delay = self.policy.delay(self.attempt);
        self.pending_retry = Some(ScheduledRetry {
            attempt: self.attempt,
            delay,
        });
        TimerRequest::Schedule(delay)
    }

    fn cancel_retry(&mut self) -> Option<TimerRequest> {
        self.pending_retry.take().map(|_| TimerRequest::Cancel)
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
