//! Huddle CLI
//!
//! Command-line interface for Huddle - document presence and sync resilience.

use std::fs::File;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use huddle_core::{Caller, Config};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Huddle - presence and sync resilience for shared documents")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Act as this user (defaults to user_id from config)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh your presence in a document once
    Heartbeat {
        /// Document ID
        document: String,
        /// Cursor payload (opaque; `{"x":..,"y":..}` renders in overlays)
        #[arg(short, long, default_value = "")]
        cursor: String,
        /// Display name (defaults to config)
        #[arg(long)]
        name: Option<String>,
        /// Display color (defaults to config)
        #[arg(long)]
        color: Option<String>,
    },
    /// List users present in a document
    #[command(alias = "ls")]
    List {
        /// Document ID
        document: String,
    },
    /// Delete stale presence records once
    Cleanup {
        /// Delete records older than this (defaults to config)
        #[arg(long)]
        older_than_ms: Option<u64>,
    },
    /// Run the cleanup sweeper until interrupted
    Sweep,
    /// Join a document: heartbeat, and show remote cursors as they move
    ///
    /// Lines on stdin of the form `x y` move your cursor.
    Join {
        /// Document ID
        document: String,
    },
    /// Inspect the local edit buffer
    Buffer {
        #[command(subcommand)]
        command: BufferCommands,
    },
    /// Connect to the sync server and monitor the connection
    ///
    /// Type `disconnect`, `reconnect`, `offline` or `online` on stdin.
    Connect {
        /// Server URL (defaults to sync_url from config)
        #[arg(long)]
        url: Option<String>,
    },
    /// Show the reconnect delay schedule
    Backoff {
        /// Number of attempts to show
        #[arg(short = 'n', long, default_value_t = 6)]
        attempts: u32,
    },
    /// Show status (identity, presence store, pending edits)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum BufferCommands {
    /// Stage content for a document section
    Save {
        document: String,
        section: String,
        /// Content (parsed as JSON when possible, otherwise stored as a string)
        content: String,
    },
    /// Show the staged entry for a section
    Read { document: String, section: String },
    /// Remove the staged entry for a section
    #[command(alias = "rm")]
    Clear { document: String, section: String },
    /// List sections of a document with staged edits
    Pending { document: String },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (user_id, display_name, sync_url, ...)
        key: String,
        /// Configuration value (empty clears optional values)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config);

    let caller = Caller::from_option(cli.user.clone().or_else(|| config.user_id.clone()));
    debug!(authenticated = caller.is_authenticated(), "Starting huddle");

    match cli.command {
        Commands::Heartbeat {
            document,
            cursor,
            name,
            color,
        } => {
            let args = commands::presence::HeartbeatArgs {
                document,
                cursor,
                name,
                color,
            };
            commands::presence::heartbeat(&config, &caller, args, &output)
        }
        Commands::List { document } => commands::presence::list(&config, &document, &output),
        Commands::Cleanup { older_than_ms } => {
            commands::presence::cleanup(&config, older_than_ms, &output)
        }
        Commands::Sweep => commands::presence::sweep(&config, &output).await,
        Commands::Join { document } => {
            commands::presence::join(&config, caller, document, &output).await
        }
        Commands::Buffer { command } => handle_buffer_command(command, &config, &output),
        Commands::Connect { url } => commands::connect::run(&config, url, &output).await,
        Commands::Backoff { attempts } => commands::backoff::show(&config, attempts, &output),
        Commands::Status => commands::status::show(&config, &caller, &output),
        Commands::Config { command } => handle_config_command(command, &config, &output),
    }
}

fn handle_buffer_command(command: BufferCommands, config: &Config, output: &Output) -> Result<()> {
    match command {
        BufferCommands::Save {
            document,
            section,
            content,
        } => commands::buffer::save(config, &document, &section, &content, output),
        BufferCommands::Read { document, section } => {
            commands::buffer::read(config, &document, &section, output)
        }
        BufferCommands::Clear { document, section } => {
            commands::buffer::clear(config, &document, &section, output)
        }
        BufferCommands::Pending { document } => commands::buffer::pending(config, &document, output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config, output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Initialize logging from HUDDLE_LOG (default `warn`)
///
/// Logs go to stderr, or to `log_file` when one is configured.
fn init_logging(config: &Config) {
    let log_level = std::env::var("HUDDLE_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::try_new(format!(
        "huddle_core={},huddle={}",
        log_level, log_level
    ))
    .unwrap_or_else(|_| EnvFilter::new("warn"));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::options().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
