//! Huddle Core Library
//!
//! Presence and sync resilience for collaborative document editing: who is
//! in a document and where their cursor is, and how a client rides out
//! network trouble without losing edits.
//!
//! # Architecture
//!
//! - **Presence**: heartbeat rows per (document, user), filtered by
//!   freshness on read and swept when long stale
//! - **Connection**: a state machine fed by transport status events that
//!   schedules reconnects with exponential backoff
//! - **Buffer**: best-effort local staging of unsent section edits
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = Arc::new(SqlitePresenceStore::open(&config.presence_db_path())?);
//! let registry = PresenceRegistry::new(store);
//!
//! registry.heartbeat(&Caller::user("ada"), Heartbeat::new("doc-1", r#"{"x":4,"y":9}"#))?;
//! let overlay = CursorOverlay::from_presence(&registry.list("doc-1")?, Some("ada"));
//! ```
//!
//! # Modules
//!
//! - `presence`: Presence registry, stores, subscriptions and background tasks
//! - `connection`: Connection state machine, driver task and WebSocket transport
//! - `buffer`: Local edit buffer and its storage backends
//! - `backoff`: Reconnect delay schedule
//! - `overlay`: Remote cursor markers and typing indicators
//! - `clock`: Injectable wall clock
//! - `config`: Application configuration

pub mod backoff;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod connection;
pub mod overlay;
pub mod presence;

pub use backoff::{compute_backoff_delay, BackoffPolicy};
pub use buffer::{BufferEntry, FileStorage, LocalBuffer, MemoryStorage, StorageError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, PresenceConfig};
pub use connection::{
    spawn_connection_task, ConnectionCommand, ConnectionEvent, ConnectionHandle,
    ConnectionMachine, ConnectionSnapshot, ConnectionState, Transport, WebSocketTransport,
};
pub use overlay::{CursorMarker, CursorOverlay, CursorPosition, TypingIndicator};
pub use presence::{
    Caller, Heartbeat, PresenceError, PresenceRegistry, PresenceView, SqlitePresenceStore,
};
