//! Document presence
//!
//! Tracks who is viewing or editing a shared document.
//!
//! ## Protocol
//!
//! 1. Each client calls `heartbeat` every few seconds with its cursor
//! 2. Readers call `list` (or hold a subscription) and only see records
//!    refreshed within the freshness window
//! 3. A sweeper periodically deletes records that are long stale
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(SqlitePresenceStore::open(&config.presence_db_path())?);
//! let registry = PresenceRegistry::new(store);
//! registry.heartbeat(&Caller::user("u-1"), Heartbeat::new("doc-1", cursor))?;
//! let present = registry.list("doc-1")?;
//! ```

mod error;
mod model;
mod registry;
mod sqlite;
mod store;
mod subscription;
mod tasks;

pub use error::{PresenceError, PresenceResult};
pub use model::{Caller, Heartbeat, PresenceRecord, PresenceView};
pub use registry::{PresenceRegistry, FRESHNESS_WINDOW};
pub use sqlite::{SqlitePresenceStore, SCHEMA_VERSION};
pub use store::{MemoryPresenceStore, PresenceStore};
pub use subscription::PresenceSubscription;
pub use tasks::{spawn_cleanup_sweeper, spawn_heartbeat};
