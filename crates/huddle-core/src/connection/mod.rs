//! Realtime connection tracking
//!
//! [`ConnectionMachine`] holds the state and decides on reconnects;
//! [`spawn_connection_task`] drives it against a [`Transport`] such as
//! [`WebSocketTransport`].
//!
//! ```ignore
//! let (transport, status_rx) = WebSocketTransport::new(&url);
//! let mut handle = spawn_connection_task(Arc::new(transport), status_rx, config.reconnect);
//! while let Some(event) = handle.event_rx.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod driver;
mod machine;
mod state;
mod websocket;

pub use driver::{
    spawn_connection_task, ConnectionCommand, ConnectionEvent, ConnectionHandle, Transport,
};
pub use machine::{ConnectionMachine, Effects, TimerRequest, TransportRequest};
pub use state::{ConnectionSnapshot, ConnectionState, ScheduledRetry, TransportStatus};
pub use websocket::WebSocketTransport;
