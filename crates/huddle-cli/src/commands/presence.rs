//! Presence command handlers

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;

use huddle_core::overlay::{CursorPosition, TypingIndicator};
use huddle_core::presence::{
    spawn_cleanup_sweeper, spawn_heartbeat, PresenceError, SqlitePresenceStore,
};
use huddle_core::{Caller, Config, CursorOverlay, Heartbeat, PresenceRegistry, PresenceView};

use crate::output::Output;

/// Arguments for a one-off heartbeat
pub struct HeartbeatArgs {
    pub document: String,
    pub cursor: String,
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Open the registry over the shared presence database
pub fn open_registry(config: &Config) -> Result<PresenceRegistry> {
    let path = config.presence_db_path();
    let store = SqlitePresenceStore::open(&path)
        .with_context(|| format!("Failed to open presence database: {:?}", path))?;
    Ok(PresenceRegistry::new(Arc::new(store))
        .with_freshness_window(config.presence.freshness_window()))
}

fn heartbeat_template(config: &Config, document: String, cursor: String) -> Heartbeat {
    Heartbeat::new(document, cursor)
        .with_display_name(config.display_name.clone())
        .with_display_color(config.display_color.clone())
}

/// Send one heartbeat
pub fn heartbeat(
    config: &Config,
    caller: &Caller,
    args: HeartbeatArgs,
    output: &Output,
) -> Result<()> {
    let registry = open_registry(config)?;

    let mut heartbeat = heartbeat_template(config, args.document.clone(), args.cursor);
    if args.name.is_some() {
        heartbeat = heartbeat.with_display_name(args.name);
    }
    if args.color.is_some() {
        heartbeat = heartbeat.with_display_color(args.color);
    }

    match registry.heartbeat(caller, heartbeat) {
        Ok(()) => {}
        Err(PresenceError::Unauthenticated) => bail!(
            "Heartbeat rejected: no identity. Pass --user or run:\n  \
             huddle config set user_id <id>"
        ),
        Err(e) => return Err(e).context("Failed to record heartbeat"),
    }

    output.success(&format!("Present in {}", args.document));
    Ok(())
}

/// List who is present in a document
pub fn list(config: &Config, document: &str, output: &Output) -> Result<()> {
    let registry = open_registry(config)?;
    let present = registry.list(document)?;
    output.print_presence(document, &present);
    Ok(())
}

/// Delete stale records once
pub fn cleanup(config: &Config, older_than_ms: Option<u64>, output: &Output) -> Result<()> {
    let registry = open_registry(config)?;
    let older_than_ms = older_than_ms.unwrap_or(config.presence.cleanup_older_than_ms);

    let removed = registry.cleanup(older_than_ms)?;

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({"removed": removed, "older_than_ms": older_than_ms})
        );
    } else {
        output.success(&format!("Removed {} stale record(s)", removed));
    }
    Ok(())
}

/// Run the sweeper until Ctrl-C
pub async fn sweep(config: &Config, output: &Output) -> Result<()> {
    let registry = open_registry(config)?;
    let interval = config.presence.cleanup_interval();

    output.message(&format!(
        "Sweeping records older than {}ms every {}ms (Ctrl-C to stop)",
        config.presence.cleanup_older_than_ms,
        interval.as_millis()
    ));

    let sweeper =
        spawn_cleanup_sweeper(registry, interval, config.presence.cleanup_older_than_ms);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    sweeper.abort();

    output.success("Sweeper stopped");
    Ok(())
}

/// Join a document until Ctrl-C or end of input
///
/// Heartbeats in the background, prints the remote cursor overlay whenever
/// the presence list changes, and reads `x y` lines from stdin to move the
/// local cursor. A remote user whose cursor moved recently is shown as typing.
pub async fn join(config: &Config, caller: Caller, document: String, output: &Output) -> Result<()> {
    if !caller.is_authenticated() {
        bail!(
            "Joining needs an identity. Pass --user or run:\n  \
             huddle config set user_id <id>"
        );
    }

    let registry = open_registry(config)?;
    let local_user = caller.user_id().map(str::to_string);

    let (cursor_tx, cursor_rx) = watch::channel(String::new());
    let heartbeat = spawn_heartbeat(
        registry.clone(),
        caller,
        heartbeat_template(config, document.clone(), String::new()),
        cursor_rx,
        config.presence.heartbeat_interval(),
    );

    let mut subscription = registry.subscribe(&document, config.presence.poll_interval());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_cursors = HashMap::new();
    let mut typing = TypingIndicator::default();

    info!(%document, "Joined document");
    output.message(&format!(
        "Joined {} (type `x y` to move your cursor, Ctrl-C to leave)",
        document
    ));

    loop {
        tokio::select! {
            present = subscription.next() => {
                let present = present?;
                let now_ms = registry.now_ms();
                track_typing(
                    &mut last_cursors,
                    &present,
                    local_user.as_deref(),
                    &mut typing,
                    now_ms,
                );
                let overlay = CursorOverlay::from_presence(&present, local_user.as_deref());
                output.print_overlay(present.len(), &overlay, &typing.typing_users(now_ms));
            }
            line = lines.next_line() => match line? {
                Some(line) => match parse_position(&line) {
                    Some(position) => {
                        let _ = cursor_tx.send(position.encode());
                    }
                    None => output.message("Expected two numbers: x y"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Dropping the sender ends the heartbeat loop; the record ages out
    drop(cursor_tx);
    let _ = heartbeat.await;

    output.success(&format!("Left {}", document));
    Ok(())
}

/// Record a typing signal for every remote user whose cursor changed
///
/// Users seen for the first time only seed `last_cursors`.
fn track_typing(
    last_cursors: &mut HashMap<String, String>,
    present: &[PresenceView],
    local_user_id: Option<&str>,
    typing: &mut TypingIndicator,
    now_ms: i64,
) {
    for view in present {
        if Some(view.user_id.as_str()) == local_user_id {
            continue;
        }
        let previous = last_cursors.insert(view.user_id.clone(), view.cursor.clone());
        if previous.is_some_and(|cursor| cursor != view.cursor) {
            typing.record(&view.user_id, now_ms);
        }
    }
    last_cursors.retain(|user_id, _| present.iter().any(|view| &view.user_id == user_id));
    typing.prune(now_ms);
}

fn parse_position(line: &str) -> Option<CursorPosition> {
    let mut parts = line.split_whitespace();
    let x: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some(CursorPosition::new(x, y))
}
