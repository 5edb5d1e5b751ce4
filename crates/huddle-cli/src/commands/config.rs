//! Config command handlers

use anyhow::{Context, Result};

use huddle_core::Config;

use crate::output::{Output, OutputFormat};

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

/// Show current configuration
pub fn show(config: &Config, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let presence = &config.presence;
            println!("Configuration:");
            println!("  data_dir:              {}", config.data_dir.display());
            println!("  user_id:               {}", or_unset(config.user_id.as_deref()));
            println!(
                "  display_name:          {}",
                or_unset(config.display_name.as_deref())
            );
            println!(
                "  display_color:         {}",
                or_unset(config.display_color.as_deref())
            );
            println!("  sync_url:              {}", or_unset(config.sync_url.as_deref()));
            println!(
                "  log_file:              {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  buffer_quota_bytes:    {}", config.buffer_quota_bytes);
            println!();
            println!("Presence:");
            println!("  freshness_window_ms:   {}", presence.freshness_window_ms);
            println!("  heartbeat_interval_ms: {}", presence.heartbeat_interval_ms);
            println!("  poll_interval_ms:      {}", presence.poll_interval_ms);
            println!("  cleanup_interval_ms:   {}", presence.cleanup_interval_ms);
            println!("  cleanup_older_than_ms: {}", presence.cleanup_older_than_ms);
            println!();
            println!("Reconnect:");
            println!("  reconnect_base_ms:     {}", config.reconnect.base_ms);
            println!("  reconnect_max_ms:      {}", config.reconnect.max_ms);
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;

    config
        .set_value(&key, &value)
        .context("Valid keys: data_dir, user_id, display_name, display_color, sync_url, log_file, buffer_quota_bytes, freshness_window_ms, heartbeat_interval_ms, poll_interval_ms, cleanup_older_than_ms, cleanup_interval_ms, reconnect_base_ms, reconnect_max_ms")?;
    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
