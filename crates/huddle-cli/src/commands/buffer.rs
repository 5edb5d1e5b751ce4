//! Local edit buffer command handlers

use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, TimeZone};
use serde_json::Value;

use huddle_core::{Config, FileStorage, LocalBuffer};

use crate::output::{Output, OutputFormat};

/// Open the buffer backed by the configured file
pub fn open_buffer(config: &Config) -> LocalBuffer {
    let storage = FileStorage::new(config.buffer_path(), config.buffer_quota_bytes);
    LocalBuffer::new(Arc::new(storage))
}

/// Parse content as JSON, falling back to a plain string
fn parse_content(content: &str) -> Value {
    serde_json::from_str(content).unwrap_or_else(|_| Value::String(content.to_string()))
}

/// Stage content for a section
///
/// Saving is best effort, so success is confirmed by reading back.
pub fn save(
    config: &Config,
    document: &str,
    section: &str,
    content: &str,
    output: &Output,
) -> Result<()> {
    let buffer = open_buffer(config);
    let content = parse_content(content);
    buffer.save(&content, document, section);

    match buffer.read(document, section) {
        Some(entry) if entry.content == content => {
            output.success(&format!("Buffered {}/{}", document, section));
            Ok(())
        }
        _ => anyhow::bail!(
            "Edit could not be buffered (storage full or unavailable). Run with HUDDLE_LOG=debug for details."
        ),
    }
}

/// Show the staged entry for a section
pub fn read(config: &Config, document: &str, section: &str, output: &Output) -> Result<()> {
    let buffer = open_buffer(config);

    let Some(entry) = buffer.read(document, section) else {
        if output.is_json() {
            println!("null");
        } else {
            output.message(&format!("Nothing buffered for {}/{}", document, section));
        }
        return Ok(());
    };

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&entry)?);
        }
        OutputFormat::Quiet => {
            println!("{}", entry.content);
        }
        OutputFormat::Human => {
            println!("Document:  {}", document);
            println!("Section:   {}", section);
            println!("Saved:     {}", format_timestamp(entry.timestamp));
            println!("Content:");
            println!("{}", serde_json::to_string_pretty(&entry.content)?);
        }
    }

    Ok(())
}

/// Remove the staged entry for a section
pub fn clear(config: &Config, document: &str, section: &str, output: &Output) -> Result<()> {
    let buffer = open_buffer(config);
    buffer.clear(document, section);
    output.success(&format!("Cleared {}/{}", document, section));
    Ok(())
}

/// List sections with staged edits
pub fn pending(config: &Config, document: &str, output: &Output) -> Result<()> {
    let buffer = open_buffer(config);
    let sections = buffer.pending_sections(document);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"document_id": document, "sections": sections})
            );
        }
        OutputFormat::Quiet => {
            for section in &sections {
                println!("{}", section);
            }
        }
        OutputFormat::Human => {
            if sections.is_empty() {
                println!("No buffered edits for {}.", document);
            } else {
                println!("Buffered edits for {}:", document);
                for section in &sections {
                    let saved = buffer
                        .read(document, section)
                        .map(|entry| format_timestamp(entry.timestamp))
                        .unwrap_or_default();
                    println!("  {}  {}", section, saved);
                }
            }
        }
    }

    Ok(())
}

fn format_timestamp(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_parse_content() {
        assert_eq!(parse_content(r#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(parse_content("plain text"), Value::String("plain text".into()));
    }

    #[test]
    fn test_save_then_read_through_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = test_config(temp.path());
        let output = Output::new(OutputFormat::Quiet);

        save(&config, "doc", "intro", r#"{"text":"hi"}"#, &output).unwrap();

        let entry = open_buffer(&config).read("doc", "intro").unwrap();
        assert_eq!(entry.content, serde_json::json!({"text": "hi"}));
        assert_eq!(open_buffer(&config).pending_sections("doc"), vec!["intro"]);

        clear(&config, "doc", "intro", &output).unwrap();
        assert!(open_buffer(&config).read("doc", "intro").is_none());
    }

    #[test]
    fn test_save_reports_quota_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config {
            buffer_quota_bytes: 8,
            ..test_config(temp.path())
        };
        let output = Output::new(OutputFormat::Quiet);

        assert!(save(&config, "doc", "intro", "far too long for the quota", &output).is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert!(!format_timestamp(0).is_empty());
    }
}
