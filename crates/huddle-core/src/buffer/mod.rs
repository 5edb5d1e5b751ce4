//! Local edit buffer
//!
//! Client-side staging for edits that could not be confirmed by the server.
//!
//! ## Architecture
//!
//! - **LocalBuffer**: best-effort save/read/clear keyed by document section
//! - **BufferStorage**: string key-value backend (file or memory)
//!
//! Storage failures never reach the caller; they are logged and the
//! operation becomes a no-op.

mod error;
mod local;
mod storage;

pub use error::{StorageError, StorageResult};
pub use local::{buffer_key, BufferEntry, LocalBuffer};
pub use storage::{BufferStorage, FileStorage, MemoryStorage};
