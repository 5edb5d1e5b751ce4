//! Status command handler

use anyhow::Result;

use huddle_core::{Caller, Config};

use super::presence::open_registry;
use crate::output::{Output, OutputFormat};

/// Show identity, presence store and sync settings
pub fn show(config: &Config, caller: &Caller, output: &Output) -> Result<()> {
    let registry = open_registry(config)?;
    let records = registry.record_count()?;
    let buffer_bytes = std::fs::metadata(config.buffer_path())
        .map(|m| m.len())
        .unwrap_or(0);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "user_id": caller.user_id(),
                    "authenticated": caller.is_authenticated(),
                    "sync_url": config.sync_url,
                    "presence": {
                        "database": config.presence_db_path(),
                        "records": records,
                        "freshness_window_ms": config.presence.freshness_window_ms
                    },
                    "buffer": {
                        "path": config.buffer_path(),
                        "size": buffer_bytes,
                        "quota": config.buffer_quota_bytes
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", caller.user_id().unwrap_or("-"));
        }
        OutputFormat::Human => {
            println!("Huddle Status");
            println!("=============");
            println!();
            println!("Identity:");
            println!("  User: {}", caller.user_id().unwrap_or("(anonymous)"));
            println!();
            println!("Sync:");
            println!(
                "  Server: {}",
                config.sync_url.as_deref().unwrap_or("(not set)")
            );
            println!();
            println!("Presence:");
            println!("  Database: {}", config.presence_db_path().display());
            println!("  Records:  {}", records);
            println!();
            println!("Edit buffer:");
            println!("  Location: {}", config.buffer_path().display());
            println!(
                "  Size:     {} / {} bytes",
                buffer_bytes, config.buffer_quota_bytes
            );
        }
    }

    Ok(())
}
