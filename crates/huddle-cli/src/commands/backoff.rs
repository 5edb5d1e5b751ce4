//! Backoff schedule command

use anyhow::Result;

use huddle_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the reconnect delay for the first `attempts` attempts
pub fn show(config: &Config, attempts: u32, output: &Output) -> Result<()> {
    let schedule: Vec<(u32, u64)> = (1..=attempts.max(1))
        .map(|attempt| (attempt, config.reconnect.delay(attempt).as_millis() as u64))
        .collect();

    match output.format {
        OutputFormat::Json => {
            let rows: Vec<_> = schedule
                .iter()
                .map(|(attempt, delay_ms)| serde_json::json!({"attempt": attempt, "delay_ms": delay_ms}))
                .collect();
            println!("{}", serde_json::Value::Array(rows));
        }
        OutputFormat::Quiet => {
            for (_, delay_ms) in &schedule {
                println!("{}", delay_ms);
            }
        }
        OutputFormat::Human => {
            println!(
                "Reconnect schedule (base {}ms, max {}ms):",
                config.reconnect.base_ms, config.reconnect.max_ms
            );
            for (attempt, delay_ms) in &schedule {
                println!("  attempt {:>3}: {:>8}ms", attempt, delay_ms);
            }
        }
    }

    Ok(())
}
