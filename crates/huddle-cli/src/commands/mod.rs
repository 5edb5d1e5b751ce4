//! CLI command handlers

pub mod backoff;
pub mod buffer;
pub mod config;
pub mod connect;
pub mod presence;
pub mod status;
