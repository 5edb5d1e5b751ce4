//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use huddle_core::{CursorOverlay, PresenceView};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print who is present in a document
    pub fn print_presence(&self, document_id: &str, views: &[PresenceView]) {
        match self.format {
            OutputFormat::Human => {
                if views.is_empty() {
                    println!("Nobody is in {}.", document_id);
                    return;
                }
                println!("{:<20}  {:<20}  {:<8}  CURSOR", "USER", "NAME", "COLOR");
                for view in views {
                    println!(
                        "{:<20}  {:<20}  {:<8}  {}",
                        truncate(&view.user_id, 20),
                        truncate(view.display_name.as_deref().unwrap_or("-"), 20),
                        view.display_color.as_deref().unwrap_or("-"),
                        truncate(&view.cursor, 40)
                    );
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"document_id": document_id, "present": views})
                );
            }
            OutputFormat::Quiet => {
                for view in views {
                    println!("{}", view.user_id);
                }
            }
        }
    }

    /// Print the remote cursor overlay for a joined document
    pub fn print_overlay(&self, present: usize, overlay: &CursorOverlay, typing: &[String]) {
        match self.format {
            OutputFormat::Human => {
                println!("{} present, {} cursor(s)", present, overlay.len());
                for marker in &overlay.markers {
                    println!(
                        "  ▏{} {} at ({}, {})",
                        marker.label, marker.color, marker.position.x, marker.position.y
                    );
                }
                if !typing.is_empty() {
                    println!("  {} typing…", typing.join(", "));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "present": present,
                        "markers": overlay.markers,
                        "typing": typing
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Truncate a string to max length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_output_modes() {
        assert!(Output::new(OutputFormat::Quiet).is_quiet());
        assert!(Output::new(OutputFormat::Json).is_json());
        assert!(!Output::new(OutputFormat::Human).is_json());
    }
}
