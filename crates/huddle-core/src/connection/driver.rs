//! Connection task
//!
//! Runs a [`ConnectionMachine`] against a live transport: transport status
//! events and user commands go in, timer and transport requests come out.
//! At most one reconnect timer exists at a time since the task owns it as a
//! single optional sleep that every schedule replaces.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info};

use super::machine::{ConnectionMachine, Effects, TimerRequest, TransportRequest};
use super::state::{ConnectionSnapshot, ConnectionState};
use crate::backoff::BackoffPolicy;

/// A realtime sync transport
///
/// Both calls return immediately; the outcome is reported back as
/// [`ConnectionState`] values on the status channel handed to
/// [`spawn_connection_task`].
pub trait Transport: Send + Sync + 'static {
    /// Start connecting, dropping any existing session
    fn connect(&self);
    /// Drop the session
    fn disconnect(&self);
}

/// Commands sent to the connection task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Go offline and stay offline
    Disconnect,
    /// Connect now with a fresh backoff schedule
    Reconnect,
    /// Platform online/offline signal
    SetOnline(bool),
    /// Disconnect and stop the task
    Shutdown,
}

/// Events emitted by the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection state changed
    StateChanged(ConnectionState),
    /// A reconnect was scheduled
    RetryScheduled { attempt: u32, delay: Duration },
    /// The reconnect timer fired and a new attempt started
    Reconnecting { attempt: u32 },
    /// Online signal changed
    OnlineChanged(bool),
}

/// Handle to control the connection task
pub struct ConnectionHandle {
    /// Send commands to the task
    pub command_tx: mpsc::Sender<ConnectionCommand>,
    /// Receive events from the task
    pub event_rx: mpsc::Receiver<ConnectionEvent>,
    /// Watch the latest snapshot
    pub snapshot_rx: watch::Receiver<ConnectionSnapshot>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Ask the task to stop and wait for it
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Spawn the connection task
///
/// Asks the transport to connect straight away. The task ends on
/// [`ConnectionCommand::Shutdown`], when every command sender is gone, or
/// when the transport closes its status channel.
pub fn spawn_connection_task<T: Transport>(
    transport: Arc<T>,
    status_rx: mpsc::Receiver<ConnectionState>,
    policy: BackoffPolicy,
) -> ConnectionHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);

    let machine = ConnectionMachine::new(policy);
    let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

    let task = tokio::spawn(connection_task_loop(
        transport,
        machine,
        status_rx,
        command_rx,
        event_tx,
        snapshot_tx,
    ));

    ConnectionHandle {
        command_tx,
        event_rx,
        snapshot_rx,
        task,
    }
}

async fn connection_task_loop<T: Transport>(
    transport: Arc<T>,
    mut machine: ConnectionMachine,
    mut status_rx: mpsc::Receiver<ConnectionState>,
    mut command_rx: mpsc::Receiver<ConnectionCommand>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    snapshot_tx: watch::Sender<ConnectionSnapshot>,
) {
    let mut retry: Option<Pin<Box<Sleep>>> = None;

    transport.connect();

    loop {
        let before = machine.state();

        let effects = tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(ConnectionCommand::Disconnect) => {
                    info!("Manual disconnect");
                    machine.disconnect()
                }
                Some(ConnectionCommand::Reconnect) => {
                    info!("Manual reconnect");
                    machine.reconnect()
                }
                Some(ConnectionCommand::SetOnline(online)) => {
                    machine.set_online(online);
                    emit(&event_tx, ConnectionEvent::OnlineChanged(online));
                    Effects::default()
                }
                Some(ConnectionCommand::Shutdown) | None => {
                    debug!("Connection task shutting down");
                    transport.disconnect();
                    break;
                }
            },
            status = status_rx.recv() => match status {
                Some(status) => {
                    debug!(%status, "Transport status");
                    machine.on_transport_status(status)
                }
                None => {
                    debug!("Transport status channel closed");
                    break;
                }
            },
            _ = wait_for_retry(&mut retry), if retry.is_some() => {
                retry = None;
                let effects = machine.on_retry_elapsed();
                if effects.transport.is_some() {
                    info!(attempt = machine.attempt(), "Reconnecting");
                    emit(&event_tx, ConnectionEvent::Reconnecting { attempt: machine.attempt() });
                }
                effects
            }
        };

        match effects.timer {
            Some(TimerRequest::Schedule(delay)) => {
                retry = Some(Box::pin(tokio::time::sleep(delay)));
                if let Some(scheduled) = machine.pending_retry() {
                    info!(
                        attempt = scheduled.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect scheduled"
                    );
                    emit(
                        &event_tx,
                        ConnectionEvent::RetryScheduled {
                            attempt: scheduled.attempt,
                            delay,
                        },
                    );
                }
            }
            Some(TimerRequest::Cancel) => retry = None,
            None => {}
        }

        match effects.transport {
            Some(TransportRequest::Connect) => transport.connect(),
            Some(TransportRequest::Disconnect) => transport.disconnect(),
            None => {}
        }

        if machine.state() != before {
            emit(&event_tx, ConnectionEvent::StateChanged(machine.state()));
        }
        snapshot_tx.send_replace(machine.snapshot());
    }

    snapshot_tx.send_replace(machine.snapshot());
}

/// Resolves when the pending retry elapses; never resolves without one
async fn wait_for_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Events are advisory; a slow consumer loses them rather than stalling
/// the task. The snapshot watch always carries the latest state.
fn emit(event_tx: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) {
    if event_tx.try_send(event).is_err() {
        debug!("Connection event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingTransport {
        fn connects(&self) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == "connect").count()
        }

        fn disconnects(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| **c == "disconnect")
                .count()
        }
    }

    impl Transport for RecordingTransport {
        fn connect(&self) {
            self.calls.lock().unwrap().push("connect");
        }

        fn disconnect(&self) {
            self.calls.lock().unwrap().push("disconnect");
        }
    }

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(400))
    }

    async fn wait_for_snapshot<F>(handle: &mut ConnectionHandle, predicate: F) -> ConnectionSnapshot
    where
        F: FnMut(&ConnectionSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), handle.snapshot_rx.wait_for(predicate))
            .await
            .expect("snapshot not reached in time")
            .expect("connection task ended")
            .clone()
    }

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
    async fn test_connects_on_start() {
        let transport = Arc::new(RecordingTransport::default());
        let (status_tx, status_rx) = mpsc::channel(8);
        let mut handle = spawn_connection_task(transport.clone(), status_rx, fast_policy());

        wait_until(|| transport.connects() == 1).await;

        status_tx.send(ConnectionState::Connected).await.unwrap();
        let snapshot = wait_for_snapshot(&mut handle, |s| s.state == ConnectionState::Connected).await;
        assert_eq!(snapshot.attempt, 1);
        assert_eq!(snapshot.retry_in, None);

        handle.shutdown().await;
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_disconnect_retries_with_backoff() {
        let transport = Arc::new(RecordingTransport::default());
        let (status_tx, status_rx) = mpsc::channel(8);
        let mut handle = spawn_connection_task(transport.clone(), status_rx, fast_policy());

        status_tx.send(ConnectionState::Connected).await.unwrap();
        status_tx.send(ConnectionState::Disconnected).await.unwrap();

        let snapshot = wait_for_snapshot(&mut handle, |s| s.retry_in.is_some()).await;
        assert_eq!(snapshot.retry_in, Some(Duration::from_millis(100)));

        wait_until(|| transport.connects() == 2).await;
        let snapshot = wait_for_snapshot(&mut handle, |s| s.attempt == 2).await;
        assert_eq!(snapshot.retry_in, None);

        // Second failure waits longer
        status_tx.send(ConnectionState::Disconnected).await.unwrap();
        let snapshot = wait_for_snapshot(&mut handle, |s| s.retry_in.is_some()).await;
        assert_eq!(snapshot.retry_in, Some(Duration::from_millis(200)));

        status_tx.send(ConnectionState::Connected).await.unwrap();
        let snapshot = wait_for_snapshot(&mut handle, |s| s.state == ConnectionState::Connected).await;
        assert_eq!(snapshot.attempt, 1);
        assert_eq!(snapshot.retry_in, None);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_disconnect_stays_disconnected() {
        let transport = Arc::new(RecordingTransport::default());
        let (status_tx, status_rx) = mpsc::channel(8);
        let mut handle = spawn_connection_task(transport.clone(), status_rx, fast_policy());

        status_tx.send(ConnectionState::Connected).await.unwrap();
        wait_for_snapshot(&mut handle, |s| s.state == ConnectionState::Connected).await;

        handle
            .command_tx
            .send(ConnectionCommand::Disconnect)
            .await
            .unwrap();
        wait_until(|| transport.disconnects() == 1).await;
        status_tx.send(ConnectionState::Disconnected).await.unwrap();

        // Several backoff periods pass without a reconnect
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.connects(), 1);
        let snapshot = handle.snapshot();
        assert!(snapshot.manual_disconnect);
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.retry_in, None);

        handle
            .command_tx
            .send(ConnectionCommand::Reconnect)
            .await
            .unwrap();
        wait_until(|| transport.connects() == 2).await;
        let snapshot = wait_for_snapshot(&mut handle, |s| !s.manual_disconnect).await;
        assert_eq!(snapshot.state, ConnectionState::Connecting);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_online_signal_reported() {
        let transport = Arc::new(RecordingTransport::default());
        let (status_tx, status_rx) = mpsc::channel(8);
        let mut handle = spawn_connection_task(transport.clone(), status_rx, fast_policy());

        status_tx.send(ConnectionState::Connected).await.unwrap();
        handle
            .command_tx
            .send(ConnectionCommand::SetOnline(false))
            .await
            .unwrap();

        let snapshot = wait_for_snapshot(&mut handle, |s| !s.is_online).await;
        assert_eq!(snapshot.state, ConnectionState::Connected);

        let mut saw_offline = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), handle.event_rx.recv()).await
        {
            if event == ConnectionEvent::OnlineChanged(false) {
                saw_offline = true;
                break;
            }
        }
        assert!(saw_offline);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_task_ends_when_status_channel_closes() {
        let transport = Arc::new(RecordingTransport::default());
        let (status_tx, status_rx) = mpsc::channel(8);
        let handle = spawn_connection_task(transport, status_rx, fast_policy());

        drop(status_tx);
        tokio::time::timeout(Duration::from_secs(5), handle.task)
            .await
            .unwrap()
            .unwrap();
    }
}
